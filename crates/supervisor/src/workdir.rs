// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 pgferry

//! The on-disk work directory layout, stable and bit-exact: one root
//! holding the catalog store, the external tool's archives, the CDC
//! journal/statement trees, and per-worker pidfiles.

use std::path::{Path, PathBuf};

/// One run's work directory. Every path method is a pure function of the
/// root, so nothing here touches the filesystem except [`ensure`].
#[derive(Debug, Clone)]
pub struct WorkDir {
	root: PathBuf,
}

impl WorkDir {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn schema_dir(&self) -> PathBuf {
		self.root.join("schema")
	}

	/// `<workdir>/schema/source.db` — the Catalog Store file.
	pub fn catalog_db(&self) -> PathBuf {
		self.schema_dir().join("source.db")
	}

	pub fn pre_dump(&self) -> PathBuf {
		self.schema_dir().join("pre.dump")
	}

	pub fn post_dump(&self) -> PathBuf {
		self.schema_dir().join("post.dump")
	}

	pub fn post_list(&self) -> PathBuf {
		self.schema_dir().join("post.list")
	}

	pub fn cdc_dir(&self) -> PathBuf {
		self.root.join("cdc")
	}

	/// `<workdir>/cdc/<timeline>` — holds Journal Segments named from the
	/// source WAL-file name, and a `statements/` sibling for the
	/// Transformer's output.
	pub fn timeline_dir(&self, timeline: u32) -> PathBuf {
		self.cdc_dir().join(timeline.to_string())
	}

	pub fn journal_dir(&self, timeline: u32) -> PathBuf {
		self.timeline_dir(timeline)
	}

	pub fn statement_dir(&self, timeline: u32) -> PathBuf {
		self.timeline_dir(timeline).join("statements")
	}

	pub fn run_dir(&self) -> PathBuf {
		self.root.join("run")
	}

	/// `<workdir>/run/<role>.pid`
	pub fn pidfile(&self, role: &str) -> PathBuf {
		self.run_dir().join(format!("{role}.pid"))
	}

	/// Creates every directory this layout needs, idempotently.
	pub fn ensure(&self, timeline: u32) -> std::io::Result<()> {
		std::fs::create_dir_all(self.schema_dir())?;
		std::fs::create_dir_all(self.journal_dir(timeline))?;
		std::fs::create_dir_all(self.statement_dir(timeline))?;
		std::fs::create_dir_all(self.run_dir())?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn layout_matches_spec_paths() {
		let wd = WorkDir::new("/var/lib/pgferry/run1");
		assert_eq!(wd.catalog_db(), Path::new("/var/lib/pgferry/run1/schema/source.db"));
		assert_eq!(wd.pre_dump(), Path::new("/var/lib/pgferry/run1/schema/pre.dump"));
		assert_eq!(wd.post_dump(), Path::new("/var/lib/pgferry/run1/schema/post.dump"));
		assert_eq!(wd.post_list(), Path::new("/var/lib/pgferry/run1/schema/post.list"));
		assert_eq!(wd.journal_dir(1), Path::new("/var/lib/pgferry/run1/cdc/1"));
		assert_eq!(wd.statement_dir(1), Path::new("/var/lib/pgferry/run1/cdc/1/statements"));
		assert_eq!(wd.pidfile("supervisor"), Path::new("/var/lib/pgferry/run1/run/supervisor.pid"));
	}

	#[test]
	fn ensure_creates_every_directory() {
		let dir = tempfile::tempdir().unwrap();
		let wd = WorkDir::new(dir.path());
		wd.ensure(1).unwrap();
		assert!(wd.schema_dir().is_dir());
		assert!(wd.journal_dir(1).is_dir());
		assert!(wd.statement_dir(1).is_dir());
		assert!(wd.run_dir().is_dir());
	}
}
