use std::path::PathBuf;

use anyhow::Result;

use crate::catalog::{MetadataSource, ModelRepository};
use crate::config::Settings;

pub fn list_services(settings: &Settings, models_dir: Option<PathBuf>) -> Result<()> {
    let mut catalog = settings.catalog.clone();
    if let Some(dir) = models_dir {
        catalog.models_dir = dir;
    }
    let repository = ModelRepository::from_settings(&catalog)?;
    let services = repository.list_services()?;

    println!(
        "{:<24} {:<12} {:<10} FULL NAME",
        "SERVICE", "VERSION", "PROTOCOL"
    );
    for meta in &services {
        println!(
            "{:<24} {:<12} {:<10} {}",
            meta.name, meta.api_version, meta.protocol, meta.service_full_name
        );
    }
    println!("{} services in {}", services.len(), catalog.models_dir.display());

    Ok(())
}
