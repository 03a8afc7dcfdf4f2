/// Provide interoperability with C return values.
pub(crate) mod interop;
