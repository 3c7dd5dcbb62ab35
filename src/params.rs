//! Parameter binding.
//!
//! Caller values become the four parallel arrays (types, values, lengths,
//! formats) that [`PgConn::exec_params`](crate::pq::PgConn::exec_params)
//! takes. Text parameters are sent as they are: the server parses them, no
//! SQL escaping is involved.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::pq::MAX_PARAMS;
use crate::protocol::types::{FormatCode, Oid, oid};

/// Type OIDs sent along with parameters that carry no explicit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMap {
    /// Type of [`Param::Bytes`] parameters, and of result columns whose text
    /// cells are unescaped into raw bytes.
    ///
    /// Default: `bytea`
    pub byte_string: Oid,

    /// Type of [`Param::Text`] parameters.
    ///
    /// Default: `0` (the server infers it from the statement)
    pub text: Oid,
}

impl Default for TypeMap {
    fn default() -> Self {
        Self {
            byte_string: oid::BYTEA,
            text: 0,
        }
    }
}

/// One statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param<'a> {
    /// SQL NULL
    Null,
    /// Sent in text format, typed by [`TypeMap::text`]
    Text(Cow<'a, str>),
    /// Sent in binary format, typed by [`TypeMap::byte_string`]
    Bytes(Cow<'a, [u8]>),
    /// Sent as is, with an explicit type and format. `None` is NULL.
    Typed {
        oid: Oid,
        format: FormatCode,
        value: Option<Cow<'a, [u8]>>,
    },
}

impl Param<'_> {
    /// A value in the server's binary layout for type `oid`.
    pub fn binary(oid: Oid, value: Vec<u8>) -> Param<'static> {
        Param::Typed {
            oid,
            format: FormatCode::Binary,
            value: Some(Cow::Owned(value)),
        }
    }

    /// Text the server parses as type `oid`.
    pub fn typed_text(oid: Oid, text: String) -> Param<'static> {
        Param::Typed {
            oid,
            format: FormatCode::Text,
            value: Some(Cow::Owned(text.into_bytes())),
        }
    }

    /// A binary `int4`, the server's own wire layout.
    pub fn int4(value: i32) -> Param<'static> {
        Param::binary(oid::INT4, value.to_be_bytes().to_vec())
    }

    /// A binary `int8`.
    pub fn int8(value: i64) -> Param<'static> {
        Param::binary(oid::INT8, value.to_be_bytes().to_vec())
    }
}

/// A value that can be sent as a statement parameter.
pub trait ToParam {
    fn to_param(&self) -> Param<'_>;
}

impl ToParam for Param<'_> {
    fn to_param(&self) -> Param<'_> {
        match self {
            Param::Null => Param::Null,
            Param::Text(s) => Param::Text(Cow::Borrowed(&**s)),
            Param::Bytes(b) => Param::Bytes(Cow::Borrowed(&**b)),
            Param::Typed { oid, format, value } => Param::Typed {
                oid: *oid,
                format: *format,
                value: value.as_deref().map(Cow::Borrowed),
            },
        }
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> Param<'_> {
        (**self).to_param()
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> Param<'_> {
        match self {
            Some(value) => value.to_param(),
            None => Param::Null,
        }
    }
}

impl ToParam for str {
    fn to_param(&self) -> Param<'_> {
        Param::Text(Cow::Borrowed(self))
    }
}

impl ToParam for String {
    fn to_param(&self) -> Param<'_> {
        Param::Text(Cow::Borrowed(self))
    }
}

impl ToParam for [u8] {
    fn to_param(&self) -> Param<'_> {
        Param::Bytes(Cow::Borrowed(self))
    }
}

impl ToParam for Vec<u8> {
    fn to_param(&self) -> Param<'_> {
        Param::Bytes(Cow::Borrowed(self))
    }
}

impl ToParam for bool {
    fn to_param(&self) -> Param<'_> {
        Param::Text(Cow::Borrowed(if *self { "t" } else { "f" }))
    }
}

macro_rules! impl_to_param_display {
    ($($t:ty),+) => {
        $(
            impl ToParam for $t {
                fn to_param(&self) -> Param<'_> {
                    Param::Text(Cow::Owned(self.to_string()))
                }
            }
        )+
    };
}

// No `u8`: a `Vec<u8>` is one `bytea` parameter, never a list of small
// integers.
impl_to_param_display!(i8, i16, i32, i64, u16, u32, u64);

macro_rules! impl_to_param_float {
    ($($t:ty),+) => {
        $(
            impl ToParam for $t {
                fn to_param(&self) -> Param<'_> {
                    // the server spells infinities out
                    let text = if self.is_infinite() {
                        Cow::Borrowed(if self.is_sign_positive() { "Infinity" } else { "-Infinity" })
                    } else {
                        Cow::Owned(self.to_string())
                    };
                    Param::Text(text)
                }
            }
        )+
    };
}

impl_to_param_float!(f32, f64);

/// An ordered list of statement parameters.
pub trait ToParams {
    fn param_count(&self) -> usize;

    /// Append one [`Param`] per parameter, in order.
    fn push_params<'a>(&'a self, out: &mut Vec<Param<'a>>);
}

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn push_params<'a>(&'a self, _out: &mut Vec<Param<'a>>) {}
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (**self).param_count()
    }

    fn push_params<'a>(&'a self, out: &mut Vec<Param<'a>>) {
        (**self).push_params(out);
    }
}

impl<T: ToParam> ToParams for [T] {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn push_params<'a>(&'a self, out: &mut Vec<Param<'a>>) {
        out.extend(self.iter().map(ToParam::to_param));
    }
}

impl<T: ToParam, const N: usize> ToParams for [T; N] {
    fn param_count(&self) -> usize {
        N
    }

    fn push_params<'a>(&'a self, out: &mut Vec<Param<'a>>) {
        self.as_slice().push_params(out);
    }
}

impl<T: ToParam> ToParams for Vec<T> {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn push_params<'a>(&'a self, out: &mut Vec<Param<'a>>) {
        self.as_slice().push_params(out);
    }
}

macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToParam),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn push_params<'a>(&'a self, out: &mut Vec<Param<'a>>) {
                $(out.push(self.$idx.to_param());)+
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_to_params!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_to_params!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_to_params!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_to_params!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);

/// Parameters laid out as the four parallel arrays of one execute call.
///
/// `lengths` is only meaningful for binary values; text values and NULLs
/// carry 0.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BoundParams<'a> {
    pub types: Vec<Oid>,
    pub values: Vec<Option<&'a [u8]>>,
    pub lengths: Vec<i32>,
    pub formats: Vec<FormatCode>,
}

impl<'a> BoundParams<'a> {
    fn with_capacity(count: usize) -> Self {
        Self {
            types: Vec::with_capacity(count),
            values: Vec::with_capacity(count),
            lengths: Vec::with_capacity(count),
            formats: Vec::with_capacity(count),
        }
    }

    fn push(&mut self, oid: Oid, value: Option<&'a [u8]>, length: i32, format: FormatCode) {
        self.types.push(oid);
        self.values.push(value);
        self.lengths.push(length);
        self.formats.push(format);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn text_value(position: usize, bytes: &[u8]) -> Result<&[u8]> {
    if memchr::memchr(0, bytes).is_some() {
        return Err(Error::Type(format!(
            "parameter ${} contains a NUL byte, which text format cannot carry",
            position
        )));
    }
    Ok(bytes)
}

fn binary_length(position: usize, bytes: &[u8]) -> Result<i32> {
    i32::try_from(bytes.len()).map_err(|_too_large| {
        Error::Type(format!(
            "parameter ${} is {} bytes, more than one value can hold",
            position,
            bytes.len()
        ))
    })
}

/// Lay `params` out for one execute call.
pub fn bind<'a>(params: &'a [Param<'_>], type_map: &TypeMap) -> Result<BoundParams<'a>> {
    if params.len() > MAX_PARAMS {
        return Err(Error::Type(format!(
            "{} parameters given, at most {} are supported",
            params.len(),
            MAX_PARAMS
        )));
    }

    let mut bound = BoundParams::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        let position = index + 1;
        match param {
            Param::Null => bound.push(0, None, 0, FormatCode::Text),
            Param::Text(text) => {
                let bytes = text_value(position, text.as_bytes())?;
                bound.push(type_map.text, Some(bytes), 0, FormatCode::Text);
            }
            Param::Bytes(bytes) => {
                let length = binary_length(position, bytes)?;
                bound.push(type_map.byte_string, Some(&**bytes), length, FormatCode::Binary);
            }
            Param::Typed {
                oid,
                format,
                value: None,
            } => bound.push(*oid, None, 0, *format),
            Param::Typed {
                oid,
                format: FormatCode::Text,
                value: Some(bytes),
            } => {
                let bytes = text_value(position, bytes)?;
                bound.push(*oid, Some(bytes), 0, FormatCode::Text);
            }
            Param::Typed {
                oid,
                format: FormatCode::Binary,
                value: Some(bytes),
            } => {
                let length = binary_length(position, bytes)?;
                bound.push(*oid, Some(&**bytes), length, FormatCode::Binary);
            }
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<P: ToParams>(params: &P) -> Vec<Param<'_>> {
        let mut out = Vec::with_capacity(params.param_count());
        params.push_params(&mut out);
        out
    }

    #[test]
    fn arrays_stay_parallel() {
        let bytes = vec![0u8, 1, 2];
        let params = (None::<i32>, "abc", bytes, 42);
        let list = collect(&params);
        let bound = bind(&list, &TypeMap::default()).unwrap();

        assert_eq!(bound.len(), 4);
        assert_eq!(bound.types, [0, 0, oid::BYTEA, 0]);
        assert_eq!(
            bound.values,
            [None, Some(&b"abc"[..]), Some(&[0u8, 1, 2][..]), Some(&b"42"[..])]
        );
        assert_eq!(bound.lengths, [0, 0, 3, 0]);
        assert_eq!(
            bound.formats,
            [
                FormatCode::Text,
                FormatCode::Text,
                FormatCode::Binary,
                FormatCode::Text
            ]
        );
    }

    #[test]
    fn empty_params() {
        let list = collect(&());
        let bound = bind(&list, &TypeMap::default()).unwrap();
        assert!(bound.is_empty());
        assert!(bound.types.is_empty() && bound.lengths.is_empty() && bound.formats.is_empty());
    }

    #[test]
    fn type_map_is_used() {
        let type_map = TypeMap {
            byte_string: 9999,
            text: oid::TEXT,
        };
        let list = vec![Param::Bytes(Cow::Borrowed(b"x")), Param::Text("y".into())];
        let bound = bind(&list, &type_map).unwrap();
        assert_eq!(bound.types, [9999, oid::TEXT]);
    }

    #[test]
    fn typed_binary_int() {
        let list = vec![Param::int4(42)];
        let bound = bind(&list, &TypeMap::default()).unwrap();
        assert_eq!(bound.types, [oid::INT4]);
        assert_eq!(bound.values, [Some(&[0u8, 0, 0, 42][..])]);
        assert_eq!(bound.lengths, [4]);
        assert_eq!(bound.formats, [FormatCode::Binary]);
    }

    #[test]
    fn nul_in_text_is_rejected() {
        let list = collect(&["ok", "bad\0value"]);
        let err = bind(&list, &TypeMap::default()).unwrap_err();
        assert!(matches!(err, Error::Type(ref m) if m.contains("$2")));
    }

    #[test]
    fn nul_in_bytes_is_fine() {
        let values = [&b"\0\0"[..]];
        let list = collect(&values);
        let bound = bind(&list, &TypeMap::default()).unwrap();
        assert_eq!(bound.lengths, [2]);
    }

    #[test]
    fn byte_vector_is_one_bytea() {
        let params = (vec![0xdeu8, 0xad],);
        let list = collect(&params);
        let bound = bind(&list, &TypeMap::default()).unwrap();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound.types, [oid::BYTEA]);
        assert_eq!(bound.values, [Some(&[0xdeu8, 0xad][..])]);
        assert_eq!(bound.formats, [FormatCode::Binary]);
    }

    #[test]
    fn typed_binary_null() {
        let list = vec![Param::Typed {
            oid: oid::INT4,
            format: FormatCode::Binary,
            value: None,
        }];
        let bound = bind(&list, &TypeMap::default()).unwrap();
        assert_eq!(bound.types, [oid::INT4]);
        assert_eq!(bound.values, [None]);
        assert_eq!(bound.lengths, [0]);
        assert_eq!(bound.formats, [FormatCode::Binary]);
    }

    #[test]
    fn too_many_params() {
        let list = vec![Param::Null; MAX_PARAMS + 1];
        assert!(matches!(
            bind(&list, &TypeMap::default()),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn scalar_text_forms() {
        assert_eq!(true.to_param(), Param::Text("t".into()));
        assert_eq!(f64::NEG_INFINITY.to_param(), Param::Text("-Infinity".into()));
        assert_eq!(1.5f32.to_param(), Param::Text("1.5".into()));
        assert_eq!((-7i64).to_param(), Param::Text("-7".into()));
    }
}
