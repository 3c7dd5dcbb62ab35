//! Placeholder rewriting for [`Cursor`](crate::Cursor) statements.
//!
//! Cursor statements use `%s` for positional and `%(name)s` for named
//! parameters. Both are rewritten into the server's `$n` form before the
//! statement is sent.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use crate::error::{Error, Result};
use crate::params::{Param, ToParam};

/// Parameters looked up by name, for [`named`].
pub trait NamedParams {
    /// The parameter called `name`, `None` if there is none.
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>>;
}

impl<T: NamedParams + ?Sized> NamedParams for &T {
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>> {
        (**self).param(name)
    }
}

impl<K: AsRef<str>, V: ToParam> NamedParams for [(K, V)] {
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>> {
        self.iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value.to_param())
    }
}

impl<K: AsRef<str>, V: ToParam, const N: usize> NamedParams for [(K, V); N] {
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>> {
        self.as_slice().param(name)
    }
}

impl<K: AsRef<str>, V: ToParam> NamedParams for Vec<(K, V)> {
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>> {
        self.as_slice().param(name)
    }
}

impl<K, V, S> NamedParams for HashMap<K, V, S>
where
    K: Borrow<str> + Hash + Eq,
    V: ToParam,
    S: BuildHasher,
{
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>> {
        self.get(name).map(ToParam::to_param)
    }
}

impl<K: Borrow<str> + Ord, V: ToParam> NamedParams for BTreeMap<K, V> {
    fn param<'a>(&'a self, name: &str) -> Option<Param<'a>> {
        self.get(name).map(ToParam::to_param)
    }
}

/// Replace each `%s` in `query` with `$1`, `$2`, ... in order.
///
/// Fails unless `query` has exactly `count` of them.
pub fn positional(query: &str, count: usize) -> Result<String> {
    let pieces: Vec<&str> = query.split("%s").collect();
    let expected = pieces.len().saturating_sub(1);
    if expected != count {
        return Err(Error::Programming(format!(
            "wrong number of arguments for command string (expected {}, got {})",
            expected, count
        )));
    }

    let mut out = String::with_capacity(query.len() + count * 2);
    for (index, piece) in pieces.iter().enumerate() {
        if index > 0 {
            out.push('$');
            out.push_str(&index.to_string());
        }
        out.push_str(piece);
    }
    Ok(out)
}

/// Replace each `%(name)s` in `query` with `$n` and collect the parameters
/// in `$n` order. A name used twice keeps its first number. `%%` stands for
/// a literal `%`.
pub fn named<'a, N: NamedParams + ?Sized>(
    query: &str,
    params: &'a N,
) -> Result<(String, Vec<Param<'a>>)> {
    let mut out = String::with_capacity(query.len());
    let mut names: Vec<&str> = Vec::new();
    let mut values = Vec::new();

    let mut rest = query;
    while let Some((before, after)) = rest.split_once('%') {
        out.push_str(before);
        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }
        if after.starts_with('s') {
            return Err(Error::Programming(
                "command contains %s with named arguments".into(),
            ));
        }
        let (name, tail) = after
            .strip_prefix('(')
            .and_then(|marker| marker.split_once(')'))
            .ok_or_else(|| Error::Programming("incomplete format in command string".into()))?;
        let tail = tail.strip_prefix('s').ok_or_else(|| {
            Error::Programming(format!("unsupported format for argument %({})", name))
        })?;

        let number = match names.iter().position(|known| *known == name) {
            Some(index) => index + 1,
            None => {
                let value = params.param(name).ok_or_else(|| {
                    Error::Programming(format!("argument %({})s not found", name))
                })?;
                names.push(name);
                values.push(value);
                values.len()
            }
        };
        out.push('$');
        out.push_str(&number.to_string());
        rest = tail;
    }
    out.push_str(rest);
    Ok((out, values))
}

/// Whether `query` is a `SELECT` that can run behind a server-side cursor:
/// no `INTO` target and no `FOR UPDATE` lock.
pub(crate) fn is_plain_select(query: &str) -> bool {
    let mut words = query.split_whitespace();
    if !words
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case("SELECT"))
    {
        return false;
    }
    let mut previous = "";
    for word in words {
        if word.eq_ignore_ascii_case("INTO")
            || (previous.eq_ignore_ascii_case("FOR") && word.eq_ignore_ascii_case("UPDATE"))
        {
            return false;
        }
        previous = word;
    }
    true
}

/// `name` as a quoted SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
