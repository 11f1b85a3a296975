/// Relative-error accuracy in percent.
///
/// Zero whenever the absolute error reaches the reference (this also covers a
/// zero or negative reference), otherwise `100 * (1 - error / reference)`.
pub fn accuracy(reference: f64, measured: f64) -> f64 {
    let error = (reference - measured).abs();
    if error >= reference {
        return 0.0;
    }
    100.0 * (1.0 - error / reference)
}
