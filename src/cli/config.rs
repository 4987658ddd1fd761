use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer ~/.config/labwatch/config.yml, fall back to /etc/labwatch
    let config_path = if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/labwatch/config.yml");
        match user_config.parent() {
            Some(parent) => match fs::create_dir_all(parent) {
                Ok(_) => user_config,
                Err(_) => {
                    eprintln!("Warning: Could not create directory {}", parent.display());
                    eprintln!("Falling back to /etc/labwatch/config.yml");
                    system_config_path()?
                }
            },
            None => system_config_path()?,
        }
    } else {
        system_config_path()?
    };

    if config_path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout.",
            config_path.display()
        )
        .into());
    }

    fs::write(&config_path, config_content)?;
    println!("Config written to {}", config_path.display());
    println!("Edit it to point at your lab log sources, then run 'labwatch run'.");
    Ok(())
}

fn system_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = PathBuf::from("/etc/labwatch/config.yml");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Could not create {}: {}", parent.display(), e))?;
    }
    Ok(path)
}
