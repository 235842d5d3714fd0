//! Four fixed file slots for one MIT-BIH record.

use crate::types::{SlotKind, UploadFile};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Fixed-shape record of the four files an upload needs.
/// Never rejects input; format checks belong to the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSlots {
    pub annotation: Option<UploadFile>,
    pub signal: Option<UploadFile>,
    pub header: Option<UploadFile>,
    pub waveform: Option<UploadFile>,
}

impl UploadSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites whatever was in `kind`.
    pub fn set_slot(&mut self, kind: SlotKind, file: UploadFile) {
        *self.slot_mut(kind) = Some(file);
    }

    pub fn get(&self, kind: SlotKind) -> Option<&UploadFile> {
        match kind {
            SlotKind::Annotation => self.annotation.as_ref(),
            SlotKind::Signal => self.signal.as_ref(),
            SlotKind::Header => self.header.as_ref(),
            SlotKind::Waveform => self.waveform.as_ref(),
        }
    }

    pub fn is_ready(&self) -> bool {
        SlotKind::ALL.iter().all(|&k| self.get(k).is_some())
    }

    pub fn is_empty(&self) -> bool {
        SlotKind::ALL.iter().all(|&k| self.get(k).is_none())
    }

    /// Slots still waiting for a file, in canonical order.
    pub fn missing(&self) -> Vec<SlotKind> {
        SlotKind::ALL
            .into_iter()
            .filter(|&k| self.get(k).is_none())
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Iterate populated slots as `(kind, file)`.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKind, &UploadFile)> {
        SlotKind::ALL
            .into_iter()
            .filter_map(move |k| self.get(k).map(|f| (k, f)))
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut Option<UploadFile> {
        match kind {
            SlotKind::Annotation => &mut self.annotation,
            SlotKind::Signal => &mut self.signal,
            SlotKind::Header => &mut self.header,
            SlotKind::Waveform => &mut self.waveform,
        }
    }
}

/// Record base path: `dir/100.dat` or `dir/100` both resolve to `dir/100`.
pub fn record_base(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if SlotKind::from_part_name(ext).is_some() => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

/// `<base>.<part>`, appended so dotted record names like `rec.v2` survive.
fn sibling(base: &Path, kind: SlotKind) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(kind.part_name());
    PathBuf::from(name)
}

/// Read every sibling file of a record (`<base>.atr`, `<base>.dat`, ...).
/// Files that don't exist are left empty; other I/O errors propagate.
pub fn load_record(path: &Path) -> io::Result<UploadSlots> {
    let base = record_base(path);
    let mut slots = UploadSlots::new();
    for kind in SlotKind::ALL {
        let file_path = sibling(&base, kind);
        match fs::read(&file_path) {
            Ok(bytes) => {
                let name = file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("record{}", kind.extension()));
                slots.set_slot(kind, UploadFile::new(name, bytes));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> UploadFile {
        UploadFile::new(name, vec![1, 2, 3])
    }

    #[test]
    fn test_empty_is_not_ready() {
        let slots = UploadSlots::new();
        assert!(!slots.is_ready());
        assert!(slots.is_empty());
        assert_eq!(slots.missing(), SlotKind::ALL.to_vec());
    }

    #[test]
    fn test_ready_iff_all_four_set() {
        // Every subset of the four slots: ready only for the full set.
        for mask in 0u8..16 {
            let mut slots = UploadSlots::new();
            for (i, kind) in SlotKind::ALL.into_iter().enumerate() {
                if mask & (1 << i) != 0 {
                    slots.set_slot(kind, file(kind.part_name()));
                }
            }
            assert_eq!(slots.is_ready(), mask == 0b1111, "mask={:04b}", mask);
            assert_eq!(slots.missing().len(), 4 - mask.count_ones() as usize);
        }
    }

    #[test]
    fn test_set_overwrites() {
        let mut slots = UploadSlots::new();
        slots.set_slot(SlotKind::Signal, file("a.dat"));
        slots.set_slot(SlotKind::Signal, file("b.dat"));
        assert_eq!(slots.get(SlotKind::Signal).unwrap().name, "b.dat");
        assert_eq!(slots.iter().count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut slots = UploadSlots::new();
        for kind in SlotKind::ALL {
            slots.set_slot(kind, file("x"));
        }
        assert!(slots.is_ready());
        slots.clear();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_record_base_strips_known_extension() {
        assert_eq!(record_base(Path::new("data/100.dat")), PathBuf::from("data/100"));
        assert_eq!(record_base(Path::new("data/100")), PathBuf::from("data/100"));
        assert_eq!(record_base(Path::new("data/100.csv")), PathBuf::from("data/100.csv"));
        assert_eq!(record_base(Path::new("data/rec.v2.dat")), PathBuf::from("data/rec.v2"));
    }

    #[test]
    fn test_load_record_partial() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("100.dat"), b"sig").unwrap();
        fs::write(dir.path().join("100.hea"), b"hdr").unwrap();

        let slots = load_record(&dir.path().join("100")).unwrap();
        assert!(!slots.is_ready());
        assert_eq!(slots.missing(), vec![SlotKind::Annotation, SlotKind::Waveform]);
        assert_eq!(slots.get(SlotKind::Signal).unwrap().name, "100.dat");
        assert_eq!(slots.get(SlotKind::Header).unwrap().bytes, b"hdr");
    }

    #[test]
    fn test_load_record_complete() {
        let dir = tempfile::tempdir().unwrap();
        for ext in ["atr", "dat", "hea", "xws"] {
            fs::write(dir.path().join(format!("208.{}", ext)), ext.as_bytes()).unwrap();
        }
        let slots = load_record(&dir.path().join("208.atr")).unwrap();
        assert!(slots.is_ready());
    }

    #[test]
    fn test_load_record_dotted_base_name() {
        let dir = tempfile::tempdir().unwrap();
        for ext in ["atr", "dat", "hea", "xws"] {
            fs::write(dir.path().join(format!("rec.v2.{}", ext)), ext.as_bytes()).unwrap();
        }
        // A decoy that with_extension would have picked up
        fs::write(dir.path().join("rec.dat"), b"wrong").unwrap();

        for given in ["rec.v2", "rec.v2.hea"] {
            let slots = load_record(&dir.path().join(given)).unwrap();
            assert!(slots.is_ready(), "{}: missing {:?}", given, slots.missing());
            let signal = slots.get(SlotKind::Signal).unwrap();
            assert_eq!(signal.name, "rec.v2.dat");
            assert_eq!(signal.bytes, b"dat");
        }
    }
}
