use std::path::{Path, PathBuf};

use ember_lang::SourceText;
use rustc_hash::FxHashSet;

use crate::error::Error;

/// One source input of a compilation request.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub enum SourceUnit {
    File(PathBuf),
    Inline(String),
}

/// The de-duplicated source inputs of one request, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    units: Vec<SourceUnit>,
    seen: FxHashSet<SourceUnit>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `unit`; returns `false` when it was already present.
    pub fn add(&mut self, unit: SourceUnit) -> bool {
        if !self.seen.insert(unit.clone()) {
            return false;
        }
        self.units.push(unit);
        true
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> bool {
        self.add(SourceUnit::File(path.into()))
    }

    pub fn add_inline(&mut self, body: impl Into<String>) -> bool {
        self.add(SourceUnit::Inline(body.into()))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.iter()
    }

    /// Reads every file once. Units whose text is identical collapse into
    /// the first of them.
    pub fn read(&self) -> Result<Vec<SourceText>, Error> {
        let mut inline = 0;
        let texts = self
            .units
            .iter()
            .map(|unit| match unit {
                SourceUnit::File(path) => read_file(path),
                SourceUnit::Inline(body) => {
                    inline += 1;
                    Ok(SourceText::new(format!("<inline-{}>", inline), body.clone()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let first: Vec<bool> = {
            let mut seen = FxHashSet::default();
            texts.iter().map(|source| seen.insert(source.text.as_str())).collect()
        };

        Ok(texts
            .into_iter()
            .zip(first)
            .filter_map(|(source, first)| first.then_some(source))
            .collect())
    }
}

impl<T: Into<SourceUnit>> FromIterator<T> for SourceSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = SourceSet::new();
        for unit in iter {
            set.add(unit.into());
        }
        set
    }
}

impl From<&Path> for SourceUnit {
    fn from(path: &Path) -> Self {
        SourceUnit::File(path.to_path_buf())
    }
}

impl From<PathBuf> for SourceUnit {
    fn from(path: PathBuf) -> Self {
        SourceUnit::File(path)
    }
}

fn read_file(path: &Path) -> Result<SourceText, Error> {
    std::fs::read_to_string(path)
        .map(|text| SourceText::new(path.display().to_string(), text))
        .map_err(|source| Error::SourceRead {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let mut set = SourceSet::new();

        assert!(set.add_inline("class A { }"));
        assert!(!set.add_inline("class A { }"));
        assert!(set.add_file("a.ember"));
        assert!(!set.add_file("a.ember"));
        assert!(set.add_inline("class B { }"));

        assert_eq!(set.len(), 3);
        assert_eq!(
            set.iter().cloned().collect::<Vec<_>>(),
            vec![
                SourceUnit::Inline("class A { }".to_string()),
                SourceUnit::File(PathBuf::from("a.ember")),
                SourceUnit::Inline("class B { }".to_string()),
            ]
        );
    }

    #[test]
    fn test_read_collapses_identical_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "class A {{ }}").unwrap();

        let mut set = SourceSet::new();
        set.add_file(file.path());
        set.add_inline("class A { }");
        set.add_inline("class B { }");

        let sources = set.read().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, file.path().display().to_string());
        assert_eq!(sources[1].name, "<inline-2>");
    }

    #[test]
    fn test_read_keeps_first_of_identical_files() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.ember", "b.ember", "c.ember", "d.ember"];
        let texts = ["class A { }", "class A { }", "class C { }", "class C { }"];
        for (name, text) in names.iter().zip(texts) {
            std::fs::write(dir.path().join(name), text).unwrap();
        }

        let set = names.iter().map(|name| dir.path().join(name)).collect::<SourceSet>();
        let sources = set.read().unwrap();

        assert_eq!(set.len(), 4);
        assert_eq!(
            sources.iter().map(|source| source.text.as_str()).collect::<Vec<_>>(),
            vec!["class A { }", "class C { }"]
        );
        assert!(sources[0].name.ends_with("a.ember"));
        assert!(sources[1].name.ends_with("c.ember"));
    }

    #[test]
    fn test_read_missing_file() {
        let set = SourceSet::from_iter([PathBuf::from("/definitely/not/here.ember")]);

        assert!(matches!(set.read(), Err(Error::SourceRead { path, .. }) if path.ends_with("here.ember")));
    }
}
