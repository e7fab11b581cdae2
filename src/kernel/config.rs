use std::path::Path;

pub const CONFIG_FILE: &str = ".alany.toml";

#[derive(Clone, Debug)]
pub struct Config {
    pub max_call_depth: usize,
    pub prompts_noninteractive: bool,
    /// Binding shared by reference between every copy of an object.
    pub entry_binding: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            prompts_noninteractive: false,
            entry_binding: "__entry__".to_string(),
        }
    }
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| {
        let s = v.to_lowercase();
        match s.as_str() {
            "1" | "true" | "yes" | "y" => Some(true),
            "0" | "false" | "no" | "n" => Some(false),
            _ => None,
        }
    })
}

fn parse_usize_env(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse::<usize>().ok()
}

fn apply_toml(cfg: &mut Config, val: &toml::Value) {
    // eval.max_call_depth (usize)
    if let Some(n) = val
        .get("eval")
        .and_then(|t| t.get("max_call_depth"))
        .and_then(|v| v.as_integer())
        && n > 0
    {
        cfg.max_call_depth = n as usize;
    }
    // prompts.noninteractive (bool)
    if let Some(b) = val
        .get("prompts")
        .and_then(|t| t.get("noninteractive"))
        .and_then(|v| v.as_bool())
    {
        cfg.prompts_noninteractive = b;
    }
    // object.entry_binding (string)
    if let Some(s) = val
        .get("object")
        .and_then(|t| t.get("entry_binding"))
        .and_then(|v| v.as_str())
        && !s.is_empty()
    {
        cfg.entry_binding = s.to_string();
    }
}

pub fn load(root: Option<&Path>) -> Config {
    let mut cfg = Config::default();

    if let Some(root) = root {
        let path = root.join(CONFIG_FILE);
        if let Ok(s) = std::fs::read_to_string(&path) {
            match s.parse::<toml::Value>() {
                Ok(val) => apply_toml(&mut cfg, &val),
                Err(err) => tracing::warn!(path = %path.display(), %err, "ignoring malformed config"),
            }
        }
    }

    // Env overrides
    if let Some(n) = parse_usize_env("ALANY_MAX_CALL_DEPTH")
        && n > 0
    {
        cfg.max_call_depth = n;
    }
    if let Some(b) = parse_bool_env("ALANY_NONINTERACTIVE") {
        cfg.prompts_noninteractive = b;
    }
    if let Ok(s) = std::env::var("ALANY_ENTRY_BINDING")
        && !s.is_empty()
    {
        cfg.entry_binding = s;
    }

    cfg
}
