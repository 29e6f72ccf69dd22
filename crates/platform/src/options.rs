//! Selectable-option contract
//!
//! The seam a select-style UI entity binds to: a closed list of option
//! names, a current selection, and a fallible setter.

/// A device capability exposing a closed, ordered set of named options.
pub trait OptionSelect {
    /// Error type
    type Error: core::fmt::Debug;

    /// The closed option list, in presentation order. Stable for the
    /// lifetime of the device.
    fn options(&self) -> &'static [&'static str];

    /// Index of the currently selected option within [`options`].
    ///
    /// [`options`]: OptionSelect::options
    fn selected(&self) -> usize;

    /// Select an option by index into [`options`].
    ///
    /// [`options`]: OptionSelect::options
    async fn select(&mut self, index: usize) -> Result<(), Self::Error>;
}
