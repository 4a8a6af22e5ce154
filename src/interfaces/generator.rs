//! Batch artifact generation driven by `generate.ini`.

use std::collections::HashMap;
use std::fs;

use configparser::ini::Ini;
use log::{error, info};

use crate::interfaces::subconverter::subconverter;
use crate::web_handlers::interfaces::build_config_from_args;

/// Iterate the artifact sections of `generate.ini` and write each rendered
/// output to its declared `path` (UTF-8 BOM prefixed). With `artifact` set
/// only that section runs.
pub fn simple_generator(config_path: &str, artifact: Option<&str>) -> Result<(), String> {
    let content =
        fs::read_to_string(config_path).map_err(|e| format!("cannot read {}: {}", config_path, e))?;

    let mut ini = Ini::new_cs();
    let map = ini.read(content)?;

    if map.is_empty() {
        return Err("no artifact sections found".to_string());
    }

    let mut generated = 0usize;
    for section in ini.sections() {
        if let Some(wanted) = artifact {
            if section != wanted {
                continue;
            }
        }

        info!("Generating artifact '{}'...", section);
        let mut args: HashMap<String, String> = HashMap::new();
        let mut path = String::new();
        if let Some(items) = map.get(&section) {
            for (key, value) in items {
                let value = value.clone().unwrap_or_default();
                if key == "path" {
                    path = value;
                } else {
                    args.insert(key.clone(), value);
                }
            }
        }

        if path.is_empty() {
            error!("Artifact '{}' has no output path, skipping.", section);
            continue;
        }

        let query_string = args
            .iter()
            .map(|(k, v)| format!("{}={}", k, crate::utils::url::url_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let config = match build_config_from_args(&args, &query_string) {
            Ok(config) => config,
            Err(e) => {
                error!("Artifact '{}' failed: {}", section, e);
                continue;
            }
        };

        match subconverter(config) {
            Ok(result) => {
                let mut output = Vec::with_capacity(result.content.len() + 3);
                output.extend_from_slice(b"\xef\xbb\xbf");
                output.extend_from_slice(result.content.as_bytes());
                if let Err(e) = fs::write(&path, output) {
                    error!("Failed to write artifact '{}' to '{}': {}", section, path, e);
                    continue;
                }
                info!("Artifact '{}' generated to '{}'.", section, path);
                generated += 1;
            }
            Err(e) => {
                error!("Artifact '{}' failed: {}", section, e);
            }
        }
    }

    if generated == 0 {
        return Err("no artifacts were generated".to_string());
    }
    info!("Generated {} artifact(s).", generated);
    Ok(())
}
