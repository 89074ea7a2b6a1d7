use crate::errors::FitError;
use crate::persistence::persistence_map::PersistenceMap;
use csv::ReaderBuilder;
use std::path::Path;

/// Loads a persistence map from a two-column CSV file (lag, persistence).
///
/// A missing or unreadable file is reported as `ResourceNotFound`;
/// malformed rows as `InvalidArgument`. Duplicate lags propagate the map's
/// own `DuplicateKey` error.
pub fn load_csv(path: &Path) -> Result<PersistenceMap, FitError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| {
            FitError::resource_not_found(format!("cannot open {}: {}", path.display(), e))
        })?;

    let mut map = PersistenceMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            FitError::resource_not_found(format!("cannot read {}: {}", path.display(), e))
        })?;
        if record.len() != 2 {
            return Err(FitError::invalid_argument(format!(
                "line {}: expected 2 fields, got {}",
                line + 1,
                record.len()
            )));
        }
        let lag: f64 = record[0].parse().map_err(|_| {
            FitError::invalid_argument(format!("line {}: bad lag '{}'", line + 1, &record[0]))
        })?;
        let value: f64 = record[1].parse().map_err(|_| {
            FitError::invalid_argument(format!(
                "line {}: bad persistence '{}'",
                line + 1,
                &record[1]
            ))
        })?;
        map.insert(lag, value)?;
    }
    Ok(map)
}
