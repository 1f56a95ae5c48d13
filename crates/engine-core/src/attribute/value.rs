//! The value union an [`super::Attribute`] accepts through `put`/`append`,
//! independent of which concrete variant ends up storing it. Grounded on
//! `milli`'s document-value extraction (a document field is a
//! dynamically typed value until it is routed to a strongly typed
//! column) — here the routing happens earlier, at the schema boundary,
//! so this union is already narrowed to what an attribute column can
//! hold.

use smartstring::alias::String as SmartString;

#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Numeric(f64),
    MultiNumeric(Vec<f64>),
    WeightedNumeric(Vec<(f64, i32)>),
    /// Single string values are short enough, in the common case, to live
    /// inline rather than heap-allocate (mirrors `milli`'s own preference
    /// for `smartstring` over `String` for small per-document strings).
    Str(SmartString),
    MultiStr(Vec<String>),
    WeightedStr(Vec<(String, i32)>),
    Predicate(PredicateValue),
    Tensor(Vec<f32>),
}

/// A boolean-tree predicate value, simplified to the conjunction of
/// feature assignments it is evaluated against (spec's `BOOLEANTREE`
/// data type, §6). Full predicate index compilation is posting-list /
/// codec territory and out of scope (spec §1).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PredicateValue {
    pub features: Vec<(String, String)>,
}
