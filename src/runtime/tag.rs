/// Key of the tag that marks the last item of an RX burst.
pub const EOB_KEY: &str = "rx_eob";

/// Stream tag
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    /// Id
    Id(u64),
    /// String
    String(String),
    /// A `bool` with a name
    NamedBool(String, bool),
    /// A `usize` with a name
    NamedUsize(String, usize),
    /// An `f64` with a name
    NamedF64(String, f64),
}

impl Tag {
    /// End-of-burst marker.
    pub fn eob() -> Self {
        Tag::NamedBool(EOB_KEY.to_string(), true)
    }

    /// Whether this is an end-of-burst marker.
    pub fn is_eob(&self) -> bool {
        matches!(self, Tag::NamedBool(k, true) if k == EOB_KEY)
    }
}

/// Item tag
#[derive(Clone, Debug, PartialEq)]
pub struct ItemTag {
    /// Index of item in the buffer
    pub index: usize,
    /// [`Tag`] value
    pub tag: Tag,
}
