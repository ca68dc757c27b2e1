//! Department lookup collaborator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use super::types::{Department, StoreError};

/// Resolves a department id to its name and blob container.
#[async_trait]
pub trait DepartmentDirectory: Send + Sync {
    /// `None` when the id is unknown.
    async fn resolve(&self, department_id: &str) -> Result<Option<Department>, StoreError>;
}

/// Fixed set of departments held in memory.
#[derive(Debug, Default, Clone)]
pub struct StaticDepartmentDirectory {
    departments: HashMap<String, Department>,
}

impl StaticDepartmentDirectory {
    /// Directory over `departments`, keyed by their ids.
    pub fn new(departments: impl IntoIterator<Item = Department>) -> Self {
        Self {
            departments: departments
                .into_iter()
                .map(|department| (department.id.clone(), department))
                .collect(),
        }
    }

    /// Load a JSON array of departments; a missing file yields an empty directory.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let departments: Vec<Department> = serde_json::from_slice(&bytes)?;
                tracing::debug!(path = %path.display(), departments = departments.len(), "Departments loaded");
                Ok(Self::new(departments))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Departments file missing; directory is empty");
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl DepartmentDirectory for StaticDepartmentDirectory {
    async fn resolve(&self, department_id: &str) -> Result<Option<Department>, StoreError> {
        Ok(self.departments.get(department_id.trim()).cloned())
    }
}
