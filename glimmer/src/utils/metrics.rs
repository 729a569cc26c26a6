#[cfg(feature = "metrics")]
pub fn measure<T>(label: &str, f: impl FnOnce() -> T) -> T {
    use std::time::Instant;

    use log::debug;

    let tt = Instant::now();
    let result = f();

    debug!("{label}: {}", humantime::format_duration(tt.elapsed()));

    result
}

#[cfg(not(feature = "metrics"))]
pub fn measure<T>(_: &str, f: impl FnOnce() -> T) -> T {
    f()
}
