use anyhow::{Context, Result};
use colored::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

const REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/scadx-cli/registry/main/registry.json";
const CACHE_FILE: &str = "registry.json";
const CACHE_TTL_SECS: u64 = 86400; // 24 hours

#[derive(Deserialize, Debug)]
pub struct Registry(HashMap<String, String>);

impl Registry {
    /// Git URL for an exact package name.
    pub fn get(name: &str) -> Option<String> {
        let registry = Self::load().unwrap_or_else(|_| Self::fallback());
        registry.0.get(name).cloned()
    }

    /// Case-insensitive substring search over package names and URLs.
    pub fn search(query: &str) -> Vec<(String, String)> {
        let registry = Self::load().unwrap_or_else(|_| Self::fallback());
        Self::search_in(registry.0, query)
    }

    fn search_in(index: HashMap<String, String>, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        let mut hits: Vec<(String, String)> = index
            .into_iter()
            .filter(|(name, url)| {
                name.to_lowercase().contains(&needle) || url.to_lowercase().contains(&needle)
            })
            .collect();
        hits.sort();
        hits
    }

    fn fallback() -> Self {
        // Fallback hardcoded registry
        let mut m = HashMap::new();
        m.insert(
            "BOSL2".to_string(),
            "https://github.com/BelfrySCAD/BOSL2.git".to_string(),
        );
        m.insert(
            "NopSCADlib".to_string(),
            "https://github.com/nophead/NopSCADlib.git".to_string(),
        );
        m.insert(
            "MCAD".to_string(),
            "https://github.com/openscad/MCAD.git".to_string(),
        );
        m.insert(
            "dotSCAD".to_string(),
            "https://github.com/JustinSDK/dotSCAD.git".to_string(),
        );
        m.insert(
            "threads-scad".to_string(),
            "https://github.com/rcolyer/threads-scad.git".to_string(),
        );
        m.insert(
            "Round-Anything".to_string(),
            "https://github.com/Irev-Dev/Round-Anything.git".to_string(),
        );
        Self(m)
    }

    fn load() -> Result<Self> {
        let cache_path = Self::cache_path()?;

        // 1. Check Cache Validity
        if let Ok(metadata) = fs::metadata(&cache_path)
            && let Ok(modified) = metadata.modified()
            && let Ok(age) = SystemTime::now().duration_since(modified)
            && age < Duration::from_secs(CACHE_TTL_SECS)
            && let Ok(content) = fs::read_to_string(&cache_path)
            && let Ok(map) = serde_json::from_str::<HashMap<String, String>>(&content)
        {
            return Ok(Self(map));
        }

        // 2. Fetch from Remote
        print!("{} Fetching registry... ", "⚡".yellow());
        let fetched = ureq::get(REGISTRY_URL)
            .config()
            .timeout_global(Some(Duration::from_secs(5)))
            .build()
            .call();
        match fetched {
            Ok(mut response) => {
                let content = response.body_mut().read_to_string()?;
                println!("{}", "✓".green());

                // Save to cache
                if let Some(parent) = cache_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&cache_path, &content)?;

                let map: HashMap<String, String> = serde_json::from_str(&content)?;
                Ok(Self(map))
            }
            Err(_) => {
                println!("{}", "Failed (Using cached/fallback)".red());
                // A stale cache still beats the built-in list
                if cache_path.exists() {
                    let content = fs::read_to_string(&cache_path)?;
                    let map: HashMap<String, String> = serde_json::from_str(&content)?;
                    Ok(Self(map))
                } else {
                    Ok(Self::fallback())
                }
            }
        }
    }

    fn cache_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".sx").join(CACHE_FILE))
    }
}
