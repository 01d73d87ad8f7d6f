use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{BallotId, BallotStatus};

use super::StatusBackend;

const STATUS_FILE: &str = "ballots_status.json";

/// Ballot status kept in a `ballots_status.json` next to each election's
/// pool, the shape the provisioning tools write. Updates go through a
/// write-to-temp-then-rename so a crash mid-write leaves the previous
/// status file intact.
pub struct FileStatusBackend {
    root: PathBuf,
}

impl FileStatusBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn status_path(&self, election_id: &str) -> PathBuf {
        self.root.join(election_id).join(STATUS_FILE)
    }
}

impl StatusBackend for FileStatusBackend {
    fn statuses(&self, election_id: &str) -> Result<HashMap<BallotId, BallotStatus>> {
        let path = self.status_path(election_id);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn set_status(&self, election_id: &str, ballot_id: &str, status: BallotStatus) -> Result<()> {
        let path = self.status_path(election_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut map = self.statuses(election_id)?;
        map.insert(ballot_id.to_string(), status);
        write_atomically(&path, &serde_json::to_vec_pretty(&map)?)?;
        Ok(())
    }
}

/// Write the full contents to a sibling temp file, fsync, then rename over
/// the target.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
