/// This function is useful for inducing random jitter into our atomic
/// operations, shaking out more possible interleavings quickly. It gets
/// fully eliminated by the compiler in non-test code.
#[cfg(any(test, feature = "lock_free_delays"))]
pub fn debug_delay() {
    use std::thread;
    use std::time::Duration;

    use rand::{thread_rng, Rng};

    let mut rng = thread_rng();

    if rng.gen_bool(1. / 1000.) {
        thread::sleep(Duration::from_micros(rng.gen_range(0..100)));
    }

    if rng.gen::<bool>() {
        thread::yield_now();
    }
}

#[cfg(not(any(test, feature = "lock_free_delays")))]
#[inline(always)]
pub const fn debug_delay() {}
