pub mod directory_artifact_store;
pub mod json_project_store;
