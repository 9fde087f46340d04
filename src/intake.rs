//! File intake: the ordered selection of user-provided files

use std::sync::Arc;

/// One user-provided file. Content is shared so snapshots are cheap.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    /// Declared MIME type, if the source provided one
    pub mime: Option<String>,
    data: Arc<[u8]>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, mime: Option<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Name with the last extension removed (`report.v2.pdf` -> `report.v2`)
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) => &self.name[..idx],
            None => &self.name,
        }
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        self.name
            .rfind('.')
            .map(|idx| self.name[idx + 1..].to_ascii_lowercase())
    }
}

/// Insertion-ordered list of files. Only appended to or cleared.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    files: Vec<InputFile>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, files: impl IntoIterator<Item = InputFile>) -> usize {
        let before = self.files.len();
        self.files.extend(files);
        self.files.len() - before
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    /// Frozen copy for an action; later appends do not affect it
    pub fn snapshot(&self) -> Vec<InputFile> {
        self.files.clone()
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(InputFile::size).sum()
    }
}

/// Drag-and-drop target state. Purely presentational apart from `drop`.
#[derive(Debug, Default)]
pub struct DropZone {
    dragging: bool,
}

impl DropZone {
    pub fn enter(&mut self) {
        self.dragging = true;
    }

    pub fn leave(&mut self) {
        self.dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// End the drag and hand the dropped files to the selection
    pub fn drop_into(
        &mut self,
        selection: &mut Selection,
        files: impl IntoIterator<Item = InputFile>,
    ) -> usize {
        self.dragging = false;
        selection.append(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(name: &str) -> InputFile {
        InputFile::new(name, None, name.as_bytes().to_vec())
    }

    #[test]
    fn test_append_preserves_order_and_duplicates() {
        let mut selection = Selection::new();
        selection.append(vec![file("a.pdf"), file("b.pdf")]);
        selection.append(vec![file("a.pdf")]);

        let names: Vec<&str> = selection.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "a.pdf"]);
    }

    #[test]
    fn test_clear_empties_selection() {
        let mut selection = Selection::new();
        selection.append(vec![file("a.pdf")]);
        selection.clear();
        assert!(selection.is_empty());
        assert_eq!(selection.total_bytes(), 0);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_appends() {
        let mut selection = Selection::new();
        selection.append(vec![file("a.pdf")]);
        let snapshot = selection.snapshot();
        selection.append(vec![file("b.pdf")]);
        selection.clear();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "a.pdf");
    }

    #[test]
    fn test_stem_and_extension() {
        assert_eq!(file("report.pdf").stem(), "report");
        assert_eq!(file("archive.tar.gz").stem(), "archive.tar");
        assert_eq!(file("README").stem(), "README");
        assert_eq!(file("Photo.JPG").extension().as_deref(), Some("jpg"));
        assert_eq!(file("README").extension(), None);
    }

    #[test]
    fn test_drop_zone() {
        let mut zone = DropZone::default();
        let mut selection = Selection::new();

        zone.enter();
        assert!(zone.is_dragging());
        zone.leave();
        assert!(!zone.is_dragging());

        zone.enter();
        let added = zone.drop_into(&mut selection, vec![file("x.png"), file("y.png")]);
        assert_eq!(added, 2);
        assert!(!zone.is_dragging());
        assert_eq!(selection.total_bytes(), 10);
    }
}
