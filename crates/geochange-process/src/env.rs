use std::{collections::BTreeMap, path::PathBuf};

const PATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    vars: BTreeMap<String, String>,
}

impl ProcessEnvironment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ambient() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn path_key(&self) -> String {
        // Windows spells it `Path`; keep whatever the ambient environment used.
        self.vars
            .keys()
            .find(|key| key.eq_ignore_ascii_case("PATH"))
            .cloned()
            .unwrap_or_else(|| "PATH".to_string())
    }

    pub fn prepend_path(&mut self, dirs: &[PathBuf]) {
        let key = self.path_key();
        let mut parts: Vec<String> = dirs.iter().map(|dir| dir.display().to_string()).collect();
        if let Some(existing) = self.vars.get(&key) {
            if !existing.is_empty() {
                parts.push(existing.clone());
            }
        }
        self.vars.insert(key, parts.join(PATH_SEPARATOR));
    }

    pub fn path_entries(&self) -> Vec<String> {
        self.get(&self.path_key())
            .map(|value| {
                value
                    .split(PATH_SEPARATOR)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_keeps_order_and_existing_entries() {
        let mut env = ProcessEnvironment::empty();
        env.set("PATH", format!("/usr/bin{PATH_SEPARATOR}/bin"));
        env.prepend_path(&[PathBuf::from("/sdk/platform-tools"), PathBuf::from("/sdk/emulator")]);

        assert_eq!(
            env.path_entries(),
            vec!["/sdk/platform-tools", "/sdk/emulator", "/usr/bin", "/bin"]
        );
    }

    #[test]
    fn prepend_reuses_existing_key_spelling() {
        let mut env = ProcessEnvironment::empty();
        env.set("Path", "C:\\Windows");
        env.prepend_path(&[PathBuf::from("tools")]);

        assert!(env.get("PATH").is_none());
        assert!(env.get("Path").unwrap().starts_with("tools"));
    }

    #[test]
    fn prepend_on_empty_environment() {
        let mut env = ProcessEnvironment::empty();
        env.prepend_path(&[PathBuf::from("/a")]);
        assert_eq!(env.get("PATH"), Some("/a"));
    }
}
