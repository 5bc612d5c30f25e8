use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use futuresdr_rfnoc::runtime::Interrupted;
use futuresdr_rfnoc::runtime::ReusableBarrier;

const POLL: Duration = Duration::from_millis(1);

#[test]
fn nobody_leaves_early() {
    for n in [2, 3, 8] {
        let barrier = Arc::new(ReusableBarrier::with_poll_interval(n, POLL));
        let arrived = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let barrier = barrier.clone();
                let arrived = arrived.clone();
                thread::spawn(move || {
                    arrived.fetch_add(1, Ordering::SeqCst);
                    barrier.wait()?;
                    assert_eq!(arrived.load(Ordering::SeqCst), n);
                    Ok::<_, Interrupted>(())
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap().unwrap();
        }
    }
}

#[test]
fn reusable_for_many_rounds() {
    const N: usize = 4;
    const ROUNDS: usize = 200;

    let barrier = Arc::new(ReusableBarrier::with_poll_interval(N, POLL));
    let arrivals: Arc<Vec<AtomicUsize>> =
        Arc::new((0..ROUNDS).map(|_| AtomicUsize::new(0)).collect());

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let barrier = barrier.clone();
            let arrivals = arrivals.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    arrivals[round].fetch_add(1, Ordering::SeqCst);
                    barrier.wait().unwrap();
                    assert_eq!(arrivals[round].load(Ordering::SeqCst), N);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn single_participant_never_blocks() {
    let barrier = ReusableBarrier::with_poll_interval(1, POLL);
    for _ in 0..10 {
        barrier.wait().unwrap();
    }

    let barrier = ReusableBarrier::with_poll_interval(0, POLL);
    barrier.wait().unwrap();
}

#[test]
fn interrupt_releases_waiters() -> Result<()> {
    let barrier = Arc::new(ReusableBarrier::with_poll_interval(3, POLL));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    assert!(handles.iter().all(|h| !h.is_finished()));

    let interrupted = Instant::now();
    barrier.interrupt();
    for h in handles {
        assert_eq!(h.join().unwrap(), Err(Interrupted));
    }
    assert!(interrupted.elapsed() < Duration::from_secs(1));

    // sticky until cleared
    assert!(barrier.is_interrupted());
    assert_eq!(barrier.wait(), Err(Interrupted));
    Ok(())
}

#[test]
fn resize_clears_interrupt() -> Result<()> {
    let barrier = Arc::new(ReusableBarrier::with_poll_interval(2, POLL));
    barrier.interrupt();
    assert_eq!(barrier.wait(), Err(Interrupted));

    barrier.resize(2);
    assert!(!barrier.is_interrupted());

    let b = barrier.clone();
    let h = thread::spawn(move || b.wait());
    barrier.wait()?;
    h.join().unwrap()?;
    Ok(())
}

#[test]
fn clear_interrupt() -> Result<()> {
    let barrier = Arc::new(ReusableBarrier::with_poll_interval(2, POLL));
    barrier.interrupt();
    barrier.clear_interrupt();
    assert!(!barrier.is_interrupted());
    assert_eq!(barrier.size(), 2);

    let b = barrier.clone();
    let h = thread::spawn(move || b.wait());
    barrier.wait()?;
    h.join().unwrap()?;
    Ok(())
}

#[test]
fn full_round_after_clearing_interrupted_waiters() -> Result<()> {
    let barrier = Arc::new(ReusableBarrier::with_poll_interval(3, POLL));

    let blocked: Vec<_> = (0..2)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.wait())
        })
        .collect();
    thread::sleep(Duration::from_millis(50));
    barrier.interrupt();
    for h in blocked {
        assert_eq!(h.join().unwrap(), Err(Interrupted));
    }

    barrier.clear_interrupt();
    assert_eq!(barrier.size(), 3);

    let returned = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let barrier = barrier.clone();
            let returned = returned.clone();
            thread::spawn(move || {
                barrier.wait()?;
                returned.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Interrupted>(())
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while returned.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if returned.load(Ordering::SeqCst) < 3 {
        // release the stragglers so the test fails instead of hanging
        barrier.interrupt();
    }
    for h in handles {
        h.join().unwrap()?;
    }
    assert_eq!(returned.load(Ordering::SeqCst), 3);
    Ok(())
}
