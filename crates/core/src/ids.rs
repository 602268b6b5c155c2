// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! Stable identifiers used across the catalog: source catalog OIDs and
//! fully-qualified relation names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A source-side catalog OID. Stable for the lifetime of a run; used as the
/// primary key for [`SourceObject`](crate::model::SourceObject) rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Oid(pub u32);

impl fmt::Display for Oid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<u32> for Oid {
	fn from(raw: u32) -> Self {
		Oid(raw)
	}
}

/// A fully-qualified `schema.name` relation name, kept as already-quoted
/// identifier parts so callers never have to re-derive quoting rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
	pub schema: String,
	pub name: String,
}

impl QualifiedName {
	pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
		Self { schema: schema.into(), name: name.into() }
	}

	/// Render as a double-quoted, dot-joined identifier suitable for
	/// interpolation into SQL text: `"schema"."name"`. Embedded quotes are
	/// doubled 's identifier-escaping rule.
	pub fn quoted(&self) -> String {
		format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
	}
}

impl fmt::Display for QualifiedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.schema, self.name)
	}
}

/// Double-quote an identifier, doubling any embedded double quotes. Used by
/// the transformer and by DDL issued from the copy/index
/// workers.
pub fn quote_ident(ident: &str) -> String {
	let mut out = String::with_capacity(ident.len() + 2);
	out.push('"');
	for c in ident.chars() {
		if c == '"' {
			out.push('"');
		}
		out.push(c);
	}
	out.push('"');
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quote_ident_doubles_embedded_quotes() {
		assert_eq!(quote_ident("plain"), "\"plain\"");
		assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
	}

	#[test]
	fn qualified_name_quotes_both_parts() {
		let qn = QualifiedName::new("public", "orders");
		assert_eq!(qn.quoted(), "\"public\".\"orders\"");
		assert_eq!(qn.to_string(), "public.orders");
	}
}
