use std::{collections::HashMap, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use hocon::{Hocon, HoconLoader};

use super::FsExt;

#[derive(Debug)]
pub struct ConfigLoader {
    hocon: Hocon,
    env: HashMap<String, String>,
    scope: String,
}

impl ConfigLoader {
    pub fn new(path: impl AsRef<Path>, scope: String) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(anyhow!("The config file {:?} was not found", path));
        }

        let hocon = HoconLoader::new()
            .load_file(path)
            .with_context(|| format!("Failed to find or load config file at: {:?}", path))?
            .hocon()?;

        Ok(Self::from_hocon(hocon, scope))
    }

    pub fn from_hocon_str(config: &str, scope: String) -> Result<Self> {
        let hocon = HoconLoader::new()
            .load_str(config)
            .context("Failed to parse config")?
            .hocon()?;

        Ok(Self::from_hocon(hocon, scope))
    }

    fn from_hocon(hocon: Hocon, scope: String) -> Self {
        let env = std::env::vars().collect::<HashMap<_, _>>();

        Self { hocon, env, scope }
    }

    /// Looks up `name` in the environment (as given or upper cased), then the scoped object, then the top level.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self
            .env
            .get(name)
            .or_else(|| self.env.get(&name.to_uppercase()))
        {
            return Some(Value::String(value.clone()));
        }

        let scope = &self.hocon[self.scope.as_str()];
        if matches!(scope, Hocon::Hash(_)) {
            if let Some(value) = Self::map_hocon(scope, name) {
                return Some(value);
            }
        }

        Self::map_hocon(&self.hocon, name)
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        self.get(name)
            .and_then(|v| v.as_string())
            .ok_or_else(|| anyhow!("Config value {} is required", name))
    }

    pub fn get_relative_path(&self, name: &str) -> Result<PathBuf> {
        self.get_string(name)?.relative_to_cwd()
    }

    pub fn load<T: Config>(&self) -> Result<T> {
        let res = T::load(self).with_context(|| format!("Failed to load {} config", self.scope))?;
        Ok(res)
    }

    fn map_hocon(hocon: &Hocon, name: &str) -> Option<Value> {
        match &hocon[name] {
            Hocon::Real(f64) => Some(Value::Float(*f64 as f32)),
            Hocon::Integer(i64) => Some(Value::Integer(*i64)),
            Hocon::String(string) => Some(Value::String(string.clone())),
            Hocon::Boolean(bool) => Some(Value::Boolean(*bool)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f32),
    Boolean(bool),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(val) => Some(*val),
            Value::String(val) => Hocon::String(val.clone()).as_bool(),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::Integer(val) => usize::try_from(*val).ok(),
            Value::String(val) => val.parse::<usize>().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(val) => u64::try_from(*val).ok(),
            Value::String(val) => val.parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(val) => Some(*val),
            Value::Integer(val) => Some(*val as f32),
            Value::String(val) => val.parse::<f32>().ok(),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(val) => Some(val.clone()),
            Value::Boolean(true) => Some("true".to_string()),
            Value::Boolean(false) => Some("false".to_string()),
            Value::Float(val) => Some(val.to_string()),
            Value::Integer(val) => Some(val.to_string()),
        }
    }
}

pub trait Config {
    fn load(config: &ConfigLoader) -> Result<Self>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Write;

    const CONFIG: &str = r#"
        run_name = "top"
        discount = 0.5

        self_learn {
            discount = 0.99
            iterations = 12
            invalid_move_penalty = -1
            normalize_returns = true
        }
    "#;

    #[test]
    fn test_scope_takes_precedence_over_top_level() {
        let config = ConfigLoader::from_hocon_str(CONFIG, "self_learn".to_string()).unwrap();

        assert_approx_eq!(config.get("discount").unwrap().as_f32().unwrap(), 0.99);
        assert_eq!(config.get_string("run_name").unwrap(), "top");
        assert_eq!(config.get("iterations").and_then(|v| v.as_usize()), Some(12));
        assert_eq!(config.get("normalize_returns").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn test_negative_integers_are_not_usize() {
        let config = ConfigLoader::from_hocon_str(CONFIG, "self_learn".to_string()).unwrap();
        let penalty = config.get("invalid_move_penalty").unwrap();

        assert_eq!(penalty.as_usize(), None);
        assert_approx_eq!(penalty.as_f32().unwrap(), -1.0);
    }

    #[test]
    fn test_missing_values() {
        let config = ConfigLoader::from_hocon_str(CONFIG, "rollout".to_string()).unwrap();

        assert!(config.get("iterations_that_do_not_exist").is_none());
        assert!(config.get_string("service_url_that_does_not_exist").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = ConfigLoader::new(file.path(), "self_learn".to_string()).unwrap();

        assert_eq!(config.get("iterations").and_then(|v| v.as_usize()), Some(12));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = ConfigLoader::new(dir.path().join("missing.conf"), "self_learn".to_string());

        assert!(res.is_err());
    }
}
