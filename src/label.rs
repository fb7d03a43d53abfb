use std::borrow::Cow;

pub trait Label {
    /// Returns a human-readable label for this item.
    /// This is used for logging and for the display name of message types.
    fn label(&self) -> Cow<'static, str>;
}
