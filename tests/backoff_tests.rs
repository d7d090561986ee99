// Reconnect backoff: doubling, cap, jitter bounds, reset

use signalsense::live_channel::Backoff;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn doubles_from_base_up_to_cap() {
    let mut b = Backoff::new(ms(1000), ms(5000), 0.0);
    let delays: Vec<Duration> = (0..6).map(|_| b.next_delay()).collect();
    assert_eq!(
        delays,
        vec![ms(1000), ms(2000), ms(4000), ms(5000), ms(5000), ms(5000)]
    );
    assert_eq!(b.attempts(), 6);
}

#[test]
fn reset_starts_over() {
    let mut b = Backoff::new(ms(100), ms(1000), 0.0);
    b.next_delay();
    b.next_delay();
    b.reset();
    assert_eq!(b.attempts(), 0);
    assert_eq!(b.next_delay(), ms(100));
}

#[test]
fn jitter_stays_within_factor_and_cap() {
    let mut b = Backoff::new(ms(1000), ms(5000), 0.5);
    for _ in 0..200 {
        b.reset();
        let first = b.next_delay();
        assert!(first >= ms(500) && first <= ms(1500), "{first:?}");
    }
    for _ in 0..50 {
        assert!(b.next_delay() <= ms(5000));
    }
}

#[test]
fn many_attempts_do_not_overflow() {
    let mut b = Backoff::new(ms(10), ms(40), 0.0);
    for _ in 0..100 {
        assert!(b.next_delay() <= ms(40));
    }
}

#[test]
fn max_below_base_is_raised_to_base() {
    let mut b = Backoff::new(ms(300), ms(100), 0.0);
    assert_eq!(b.next_delay(), ms(300));
    assert_eq!(b.next_delay(), ms(300));
}
