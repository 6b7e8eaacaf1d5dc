use crate::errors::{AppError, AppResult};
use crate::models::{Record, SearchField};
use std::fs;
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"ATLS";
// Upper bound on what a decode may allocate.
const MAX_STORE_BYTES: usize = 256 * 1024 * 1024;

type StoreImage = ([u8; 4], Option<Vec<Record>>);

fn codec_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_STORE_BYTES>()
}

/// Ordered points of one workspace.
///
/// `None` is the unloaded state: nothing has been fetched or decoded yet.
/// A successful fetch of zero points is `Some(vec![])` and is not unloaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Option<Vec<Record>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Some(records),
        }
    }

    pub fn add_record(&mut self, record: Record) {
        self.records.get_or_insert_with(Vec::new).push(record);
    }

    pub fn replace_all(&mut self, records: Vec<Record>) {
        self.records = Some(records);
    }

    pub fn size(&self) -> usize {
        self.records.as_ref().map_or(0, Vec::len)
    }

    pub fn is_unloaded(&self) -> bool {
        self.records.is_none()
    }

    /// Snapshot of the current sequence.
    pub fn records(&self) -> Vec<Record> {
        self.records.clone().unwrap_or_default()
    }

    pub fn find(&self, field: SearchField, query: &str) -> AppResult<Vec<Record>> {
        match field {
            SearchField::X => self.find_by_x(query),
            SearchField::Y => self.find_by_y(query),
            SearchField::Name => Ok(self.find_by_name(query)),
        }
    }

    pub fn find_by_x(&self, query: &str) -> AppResult<Vec<Record>> {
        let value = parse_coordinate_query(query)?;
        Ok(self.filtered(|record| record.x == value))
    }

    pub fn find_by_y(&self, query: &str) -> AppResult<Vec<Record>> {
        let value = parse_coordinate_query(query)?;
        Ok(self.filtered(|record| record.y == value))
    }

    /// Case-sensitive substring match on the point name.
    pub fn find_by_name(&self, query: &str) -> Vec<Record> {
        self.filtered(|record| record.name.contains(query))
    }

    fn filtered(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.records
            .iter()
            .flatten()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Magic followed by the optional record list, so an unloaded store
    /// encodes differently from a loaded empty one.
    pub fn encode(&self) -> AppResult<Vec<u8>> {
        bincode::encode_to_vec((MAGIC, self.records.as_deref()), codec_config())
            .map_err(|error| AppError::Internal(format!("failed to encode store: {}", error)))
    }

    pub fn decode(bytes: &[u8]) -> AppResult<Self> {
        let ((magic, records), consumed): (StoreImage, usize) =
            bincode::decode_from_slice(bytes, codec_config())
                .map_err(|error| AppError::Decode(error.to_string()))?;
        if magic != MAGIC {
            return Err(AppError::Decode("not a point store file".to_string()));
        }
        if consumed != bytes.len() {
            return Err(AppError::Decode(format!(
                "{} trailing bytes after the record list",
                bytes.len() - consumed
            )));
        }
        match records {
            Some(records) => Ok(Self::with_records(records)),
            None => Err(AppError::Decode(
                "store was saved before any data was loaded".to_string(),
            )),
        }
    }

    /// Writes the encoded store next to `path` and renames it into place,
    /// so a failed write never clobbers an existing file.
    pub fn save_to_file(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
        }
        let encoded = self.encode()?;
        let temp_path = temp_path_for(path);
        let result = fs::write(&temp_path, encoded)
            .and_then(|_| fs::rename(&temp_path, path))
            .map_err(|error| {
                AppError::Io(format!("failed to save {}: {}", path.to_string_lossy(), error))
            });
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    pub fn load_from_file(path: &Path) -> AppResult<Self> {
        let bytes = fs::read(path).map_err(|error| {
            AppError::Io(format!("failed to read {}: {}", path.to_string_lossy(), error))
        })?;
        Self::decode(&bytes)
    }
}

fn parse_coordinate_query(query: &str) -> AppResult<f64> {
    query
        .trim()
        .parse::<i32>()
        .map(f64::from)
        .map_err(|_| AppError::InvalidQuery(format!("{:?} is not an integer coordinate", query)))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
