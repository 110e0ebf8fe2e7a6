use super::*;
use crate::sync::Queue;
use crate::task::JoinError;
use crate::time::sleep;
use anyhow::Result;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn test_simple_queue_handoff() -> Result<()> {
    let event_loop = Builder::new().build();
    let queue: Queue<i32> = Queue::new();
    let start = Instant::now();

    let producer = queue.clone();
    event_loop.call_soon(async move {
        sleep(Duration::from_millis(1500)).await;
        producer.push(42).await;
        producer.push(21).await;
    });

    let consumer = queue.clone();
    let pop_task = event_loop.call_soon(async move {
        let v1 = consumer.pop().await;
        assert_eq!(42, v1);

        // The producer slept before pushing.
        let first = Instant::now();
        assert!(first.duration_since(start) >= Duration::from_millis(1500));

        // The second item is already queued: the pop is instant.
        let v2 = consumer.pop().await;
        assert_eq!(21, v2);
        assert!(first.elapsed() <= Duration::from_millis(5));

        v1
    });

    assert_eq!(event_loop.run_until_complete(pop_task)?, 42);
    Ok(())
}

#[test]
fn test_try_pop_on_empty_then_blocking_pop() -> Result<()> {
    let event_loop = Builder::new().build();
    let queue: Queue<i32> = Queue::new();
    let start = Instant::now();

    let producer = queue.clone();
    event_loop.call_soon(async move {
        sleep(Duration::from_millis(1500)).await;
        producer.push(42).await;
        producer.push(21).await;
    });

    let consumer = queue.clone();
    let pop_task = event_loop.call_soon(async move {
        // The producer is still sleeping: nothing to take yet.
        assert_eq!(consumer.try_pop(), None);

        let v1 = consumer.pop().await;
        assert_eq!(42, v1);
        let first = Instant::now();
        assert!(first.duration_since(start) >= Duration::from_millis(1500));

        // The second item is already there.
        assert_eq!(consumer.try_pop(), Some(21));
        assert!(first.elapsed() <= Duration::from_millis(5));

        v1
    });

    assert_eq!(event_loop.run_until_complete(pop_task)?, 42);
    Ok(())
}

#[test]
fn test_bounded_queue_backpressure() -> Result<()> {
    let event_loop = Builder::new().build();
    let queue: Queue<i32> = Queue::bounded(10);
    let start = Instant::now();

    // Fully populate the queue.
    for i in 0..10 {
        assert!(queue.try_push(i));
    }

    let producer = queue.clone();
    let push_task = event_loop.call_soon(async move {
        // The queue is full: this push must wait for the consumer.
        producer.push(42).await;
        assert!(start.elapsed() >= Duration::from_millis(1500));
    });

    let consumer = queue.clone();
    let pop_task = event_loop.call_soon(async move {
        sleep(Duration::from_millis(1500)).await;
        for _ in 0..10 {
            consumer.pop().await;
        }
        assert_eq!(consumer.pop().await, 42);
    });

    event_loop.run_until_complete(pop_task)?;
    assert!(push_task.is_complete());
    Ok(())
}

#[test]
fn test_try_push_on_full_queue() -> Result<()> {
    let event_loop = Builder::new().build();
    let queue: Queue<i32> = Queue::bounded(10);
    let start = Instant::now();

    for i in 0..10 {
        assert!(queue.try_push(i));
    }

    let producer = queue.clone();
    event_loop.call_soon(async move {
        // The queue is full.
        assert!(!producer.try_push(42));
        producer.push(1337).await;

        // The consumer has drained the queue by now: there is room again.
        assert!(producer.try_push(42));
        assert!(start.elapsed() >= Duration::from_millis(1500));
    });

    let consumer = queue.clone();
    let pop_task = event_loop.call_soon(async move {
        sleep(Duration::from_millis(1500)).await;
        for _ in 0..10 {
            consumer.pop().await;
        }
        assert_eq!(consumer.pop().await, 1337);
        assert_eq!(consumer.pop().await, 42);
    });

    event_loop.run_until_complete(pop_task)?;
    Ok(())
}

#[test]
fn test_cancellation_wakes_a_blocked_task() {
    let event_loop = Builder::new().build();
    let queue: Queue<i32> = Queue::new();
    let start = Instant::now();

    // Blocks forever: nothing ever pushes.
    let waiter = queue.clone();
    let blocked = event_loop.call_soon(async move { waiter.pop().await });

    let victim = blocked.clone();
    event_loop.call_soon(async move {
        sleep(Duration::from_millis(100)).await;
        victim.cancel();
    });

    let err = event_loop.run_until_complete(blocked).unwrap_err();
    let join_err = err.downcast_ref::<JoinError>().expect("expected a JoinError");
    assert!(join_err.is_cancelled());
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_nested_yield_to() -> Result<()> {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async { yield_to(async { 7 }).await });
    assert_eq!(event_loop.run_until_complete(handle)?, 7);
    Ok(())
}

#[test]
fn test_deadlock_is_detected() {
    let event_loop = Builder::new().build();
    let queue: Queue<i32> = Queue::new();

    let consumer = queue.clone();
    let stuck = event_loop.call_soon(async move { consumer.pop().await });

    let err = event_loop.run_until_complete(stuck).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>(),
        Some(&RuntimeError::Deadlock)
    );
}

#[test]
fn test_nested_loop_is_rejected() {
    let outer = Builder::new().build();

    let handle = outer.call_soon(async {
        let inner = Builder::new().build();
        let task = inner.call_soon(async { 1 });
        inner.run_until_complete(task)
    });

    let inner_result = outer.run_until_complete(handle).unwrap();
    let err = inner_result.unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>(),
        Some(&RuntimeError::NestedLoop)
    );
}

#[test]
fn test_loop_uninstalls_after_running() -> Result<()> {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async { 1 });
    event_loop.run_until_complete(handle)?;

    // A fresh loop on the same thread must be accepted now.
    let second = Builder::new().build();
    let handle = second.call_soon(async { 2 });
    assert_eq!(second.run_until_complete(handle)?, 2);
    Ok(())
}

#[test]
fn test_task_panic_is_reraised_by_run_until_complete() {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async { panic!("task exploded") });

    let unwind = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        event_loop.run_until_complete(handle)
    }));
    let payload = unwind.unwrap_err();
    assert_eq!(*payload.downcast::<&str>().unwrap(), "task exploded");
}

#[test]
fn test_get_result_before_completion_is_not_ready() {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async { 5 });

    let err = handle.get_result().unwrap_err();
    assert!(err.is_not_ready());

    // The failed retrieval must not consume anything.
    assert_eq!(event_loop.run_until_complete(handle).unwrap(), 5);
}

#[test]
fn test_result_is_consumed_once() -> Result<()> {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async { String::from("once") });
    let observer = handle.clone();

    assert_eq!(event_loop.run_until_complete(handle)?, "once");

    // `run_until_complete` took the value; clones see it as consumed.
    assert!(observer.is_complete());
    assert!(observer.get_result().is_err());
    Ok(())
}

#[test]
fn test_cancel_before_first_resume_skips_user_code() {
    let event_loop = Builder::new().build();
    let ran = Rc::new(std::cell::Cell::new(false));

    let flag = Rc::clone(&ran);
    let doomed = event_loop.call_soon(async move { flag.set(true) });
    doomed.cancel();

    let root = event_loop.call_soon(async { "done" });
    assert_eq!(event_loop.run_until_complete(root).unwrap(), "done");

    assert!(doomed.is_complete());
    assert!(doomed.get_result().unwrap_err().is_cancelled());
    assert!(!ran.get(), "cancelled task must never run user code");
}

#[test]
fn test_cancel_is_idempotent_and_noop_after_completion() -> Result<()> {
    let event_loop = Builder::new().build();

    let handle = event_loop.call_soon(async { 9 });
    let root = event_loop.call_soon(async { "done" });
    event_loop.run_until_complete(root)?;

    // The task already completed normally; cancelling now changes nothing.
    handle.cancel();
    handle.cancel();
    assert_eq!(handle.get_result()?, 9);
    Ok(())
}

#[test]
fn test_yield_to_reraises_subtask_panic_in_caller() {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async {
        yield_to(async { panic!("inner failure") }).await
    });

    let unwind = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        event_loop.run_until_complete(handle)
    }));
    let payload = unwind.unwrap_err();
    assert_eq!(*payload.downcast::<&str>().unwrap(), "inner failure");
}

#[test]
fn test_await_task_handle_from_another_task() -> Result<()> {
    let event_loop = Builder::new().build();

    let worker = event_loop.call_soon(async {
        sleep(Duration::from_millis(10)).await;
        "worker value"
    });

    let root = event_loop.call_soon(async move { worker.await.expect("worker failed") });
    assert_eq!(event_loop.run_until_complete(root)?, "worker value");
    Ok(())
}

#[test]
fn test_task_id_is_ambient_inside_a_task() -> Result<()> {
    let event_loop = Builder::new().build();
    let handle = event_loop.call_soon(async { crate::task::id() });
    let expected = handle.id();

    assert_eq!(event_loop.run_until_complete(handle)?, expected);
    assert_eq!(crate::task::try_id(), None);
    Ok(())
}

#[test]
fn test_loop_stops_as_soon_as_root_completes() -> Result<()> {
    let event_loop = Builder::new().build();
    let straggler_ran = Rc::new(std::cell::Cell::new(false));

    let flag = Rc::clone(&straggler_ran);
    event_loop.call_soon(async move {
        sleep(Duration::from_millis(200)).await;
        flag.set(true);
    });

    let root = event_loop.call_soon(async { 1 });
    let start = Instant::now();
    event_loop.run_until_complete(root)?;

    assert!(start.elapsed() < Duration::from_millis(200));
    assert!(!straggler_ran.get());
    Ok(())
}
