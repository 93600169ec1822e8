use std::collections::HashMap;

use super::models::BackupJob;

/// Configuration change detection result
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl ConfigChanges {
    /// Compare two job lists by name
    pub fn between(old_jobs: &[BackupJob], new_jobs: &[BackupJob]) -> Self {
        let mut changes = ConfigChanges::default();

        let old_map: HashMap<_, _> = old_jobs.iter().map(|j| (j.name.as_str(), j)).collect();
        let new_map: HashMap<_, _> = new_jobs.iter().map(|j| (j.name.as_str(), j)).collect();

        for job in new_jobs {
            match old_map.get(job.name.as_str()) {
                None => changes.added.push(job.name.clone()),
                Some(old_job) if *old_job != job => changes.modified.push(job.name.clone()),
                Some(_) => {}
            }
        }

        for job in old_jobs {
            if !new_map.contains_key(job.name.as_str()) {
                changes.removed.push(job.name.clone());
            }
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}
