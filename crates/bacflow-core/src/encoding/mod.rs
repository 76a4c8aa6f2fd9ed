/// Unsigned/signed/real primitives and context/application helpers.
pub mod primitives;
/// Bounds-checked cursor over received bytes.
pub mod reader;
/// Application, context and opening/closing tags.
pub mod tag;
/// Bounded byte sink used by every encoder.
pub mod writer;
