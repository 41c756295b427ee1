//! Registry of loaded source files.

use super::FileId;

/// One loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Display name, usually the path the driver read.
    pub name: String,
    /// File contents for diagnostics display. The driver stores a
    /// lossy conversion when the on-disk bytes were not valid UTF-8;
    /// the lexer works on the raw bytes, not this copy.
    pub src: String,
}

impl SourceFile {
    /// Returns the 1-based line containing `offset`, as text, for snippet
    /// rendering. Returns `None` if `offset` is out of bounds.
    pub fn line_at(&self, offset: usize) -> Option<&str> {
        if offset > self.src.len() {
            return None;
        }
        let start = self.src[..offset].rfind('\n').map_or(0, |p| p + 1);
        let end = self.src[start..]
            .find('\n')
            .map_or(self.src.len(), |p| start + p);
        Some(&self.src[start..end])
    }
}

/// All source files loaded during one compilation.
///
/// Files are registered once and never removed; a [`FileId`] is an index
/// into this map and stays valid for the whole session.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Register a file and return its id.
    pub fn add_file(&mut self, name: impl Into<String>, src: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            name: name.into(),
            src: src.into(),
        });
        id
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    /// Display name for a file, or `"<unknown>"` for an unregistered id.
    pub fn name(&self, id: FileId) -> &str {
        self.get(id).map_or("<unknown>", |f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut map = SourceMap::new();
        let id = map.add_file("main.to", "def f():\n    return 1\n");
        assert_eq!(map.name(id), "main.to");
        assert!(map.get(id).is_some());
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.to", "");
        let b = map.add_file("b.to", "");
        assert_eq!(a, FileId(0));
        assert_eq!(b, FileId(1));
    }

    #[test]
    fn test_line_at() {
        let mut map = SourceMap::new();
        let id = map.add_file("a.to", "first\nsecond\nthird");
        let file = map.get(id).unwrap();
        assert_eq!(file.line_at(0), Some("first"));
        assert_eq!(file.line_at(6), Some("second"));
        assert_eq!(file.line_at(13), Some("third"));
        assert_eq!(file.line_at(999), None);
    }

    #[test]
    fn test_unknown_file_name() {
        let map = SourceMap::new();
        assert_eq!(map.name(FileId(7)), "<unknown>");
    }
}
