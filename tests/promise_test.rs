mod common;

#[cfg(test)]
mod tests {
    use super::common::Timers;
    use futures::executor::block_on;
    use promise_chain::{all, race, AwaitError, JobQueue, Promise, PromiseState};
    use std::{cell::RefCell, rc::Rc};

    fn delayed<T: Clone + 'static>(
        queue: &JobQueue,
        timers: &Timers,
        delay: u64,
        outcome: Result<T, String>,
    ) -> Promise<T, String> {
        let timers = timers.clone();
        Promise::new(queue, move |resolver| {
            timers.set_timeout(delay, move || resolver.resolve_with(outcome));
            Ok(())
        })
    }

    #[test]
    fn test_thrown_error_surfaces_at_catch() {
        let queue = JobQueue::new();
        let caught = Promise::<u32, &str>::resolved(&queue, 1)
            .then(|_| Err::<u32, _>("boom"))
            .then(|v| Ok(v + 1))
            .then(|v| Ok(v * 2))
            .catch(|reason| Ok(reason.len() as u32));
        queue.run_until_stalled().unwrap();
        assert_eq!(caught.value(), Some(4));
    }

    #[test]
    fn test_catch_yields_the_thrown_value() {
        let queue = JobQueue::new();
        let caught = Promise::<&str, &str>::resolved(&queue, "fine")
            .then(|_| Err::<&str, _>("boom"))
            .catch(Ok);
        queue.run_until_stalled().unwrap();
        assert_eq!(caught.value(), Some("boom"));
    }

    #[test]
    fn test_chain_of_n_thens_takes_n_jobs() {
        const DEPTH: usize = 25;
        let queue = JobQueue::new();
        let mut tail = Promise::<usize, ()>::resolved(&queue, 0);
        for _ in 0..DEPTH {
            tail = tail.then(|v| Ok(v + 1));
        }
        assert_eq!(queue.run_until_stalled(), Ok(DEPTH));
        assert_eq!(queue.jobs_run(), DEPTH);
        assert_eq!(tail.value(), Some(DEPTH));
    }

    #[test]
    fn test_independent_chains_interleave() {
        let queue = JobQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |tag: &'static str| {
            let log = log.clone();
            move |v: u32| {
                log.borrow_mut().push(tag);
                Ok::<_, ()>(v)
            }
        };
        let _a = Promise::resolved(&queue, 1).then(push("a1")).then(push("a2"));
        let _b = Promise::resolved(&queue, 2).then(push("b1")).then(push("b2"));
        queue.run_until_stalled().unwrap();
        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_observers_keep_registration_order_across_settlement() {
        let queue = JobQueue::new();
        let (resolver, promise) = Promise::<u32, ()>::with_resolver(&queue);
        let log = Rc::new(RefCell::new(Vec::new()));
        let record = |tag: u32| {
            let log = log.clone();
            move |_: u32| {
                log.borrow_mut().push(tag);
                Ok::<_, ()>(())
            }
        };
        let _before = promise.then(record(1));
        let _also_before = promise.then(record(2));
        resolver.resolve(0);
        let _after = promise.then(record(3));
        queue.run_until_stalled().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_then_catch_then_after_timeout() {
        let queue = JobQueue::new();
        let timers = Timers::new(&queue);
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());

        let end = delayed(&queue, &timers, 2000, Ok("test111".to_string()))
            .then(move |res| {
                l1.borrow_mut().push(format!("res: {res}"));
                Ok(())
            })
            .catch(move |err| {
                l2.borrow_mut().push(format!("err: {err}"));
                Ok(())
            })
            .then(move |res| {
                l3.borrow_mut().push(format!("res222: {res:?}"));
                Ok(())
            });

        timers.run();
        assert_eq!(timers.now(), 2000);
        assert_eq!(*log.borrow(), vec!["res: test111", "res222: ()"]);
        assert_eq!(end.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn test_race_picks_the_earlier_timer() {
        let queue = JobQueue::new();
        let timers = Timers::new(&queue);
        let a = delayed(&queue, &timers, 100, Ok("a"));
        let b = delayed(&queue, &timers, 10, Ok("b"));
        let winner = race(&queue, vec![a, b]);
        timers.run();
        assert_eq!(winner.value(), Some("b"));
    }

    #[test]
    fn test_race_reports_earlier_failure() {
        let queue = JobQueue::new();
        let timers = Timers::new(&queue);
        let a = delayed(&queue, &timers, 5, Err::<u32, _>("a failed".to_string()));
        let b = delayed(&queue, &timers, 50, Ok(2));
        let winner = race(&queue, vec![a, b]);
        timers.run();
        assert_eq!(winner.reason(), Some("a failed".to_string()));
    }

    #[test]
    fn test_all_orders_by_position_not_completion() {
        let queue = JobQueue::new();
        let timers = Timers::new(&queue);
        let joined = all(
            &queue,
            vec![
                delayed(&queue, &timers, 30, Ok(1)),
                delayed(&queue, &timers, 10, Ok(2)),
                delayed(&queue, &timers, 20, Ok(3)),
            ],
        );
        timers.run();
        assert_eq!(joined.value(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_all_rejects_without_waiting_for_the_rest() {
        let queue = JobQueue::new();
        let timers = Timers::new(&queue);
        let joined = all(
            &queue,
            vec![
                delayed(&queue, &timers, 100, Ok(1)),
                delayed(&queue, &timers, 10, Err("x".to_string())),
            ],
        );
        let settled_at = Rc::new(RefCell::new(None));
        let (slot, clock) = (settled_at.clone(), timers.clone());
        let _observed = joined.catch(move |reason| {
            *slot.borrow_mut() = Some(clock.now());
            Err::<Vec<u32>, _>(reason)
        });
        timers.run();
        assert_eq!(joined.reason(), Some("x".to_string()));
        assert_eq!(*settled_at.borrow(), Some(10));
    }

    #[test]
    fn test_await_chain() {
        let queue = JobQueue::new();
        let timers = Timers::new(&queue);
        let total = delayed(&queue, &timers, 5, Ok(20)).then(|v| Ok(v + 1));
        timers.run();
        assert_eq!(block_on(async { total.await }), Ok(21));
    }

    #[test]
    fn test_await_abandoned_promise() {
        let queue = JobQueue::new();
        let dropped = Promise::<u32, String>::new(&queue, |_resolver| Ok(()));
        let chained = dropped.then(|v| Ok(v)).finally(|| Ok(()));
        assert_eq!(block_on(chained), Err(AwaitError::Abandoned));
    }

    #[test]
    fn test_run_until_settled_stops_early() {
        let queue = JobQueue::new();
        let first = Promise::<u32, ()>::resolved(&queue, 1).then(|v| Ok(v));
        let second = Promise::<u32, ()>::resolved(&queue, 2)
            .then(|v| Ok(v))
            .then(|v| Ok(v));
        assert_eq!(queue.run_until_settled(&first), Ok(1));
        assert!(second.is_pending());
        queue.run_until_stalled().unwrap();
        assert_eq!(second.value(), Some(2));
    }
}
