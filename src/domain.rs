use crate::config::YConvention;
use crate::error::{ExtractError, ExtractResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_SUFFIX: &str = ".out.pftcl";
pub const EXTENTS_SUFFIX: &str = ".txt";
pub const MASK_SUFFIX: &str = ".out.mask.pfb";

// Full-domain grid cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellIndex {
    pub x: i64,
    pub y: i64,
}

impl CellIndex {
    pub fn new(x: i64, y: i64) -> Self {
        CellIndex { x, y }
    }
}

/// Identity and bounding box of one simulation run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDescriptor {
    run_dir: PathBuf,
    run_name: String,
    config_path: PathBuf,
    lower_left: CellIndex,
    upper_right: CellIndex,
}

impl DomainDescriptor {
    pub fn from_run_dir(run_dir: &Path, y_convention: YConvention) -> ExtractResult<Self> {
        let config_path = find_single(run_dir, "configuration file (*.out.pftcl)", |name| {
            name.ends_with(CONFIG_SUFFIX)
        })?;
        let run_name = run_name_from_config(&config_path);

        let extents_name = format!("{}{}", run_name, EXTENTS_SUFFIX);
        let what = format!("extents file ({})", extents_name);
        let extents_path = find_single(run_dir, &what, |name| name == extents_name)?;
        let content = fs::read_to_string(&extents_path)
            .map_err(|e| ExtractError::io(&extents_path, e))?;
        let (lower_left, upper_right) = parse_extents(&content, &extents_path, y_convention)?;

        info!(
            run = %run_name,
            ?lower_left,
            ?upper_right,
            ?y_convention,
            "resolved run domain"
        );

        Ok(DomainDescriptor {
            run_dir: run_dir.to_path_buf(),
            run_name,
            config_path,
            lower_left,
            upper_right,
        })
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn lower_left(&self) -> CellIndex {
        self.lower_left
    }

    pub fn upper_right(&self) -> CellIndex {
        self.upper_right
    }

    pub fn mask_path(&self) -> PathBuf {
        self.run_dir.join(format!("{}{}", self.run_name, MASK_SUFFIX))
    }

    /// Path of a file named in the configuration, relative to the run directory.
    pub fn resolve(&self, file_name: &str) -> PathBuf {
        self.run_dir.join(file_name)
    }

    pub fn lookup_key(&self, key: &str) -> ExtractResult<String> {
        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ExtractError::io(&self.config_path, e))?;
        lookup_key_in(&content, key).ok_or_else(|| ExtractError::MissingConfigKey {
            key: key.to_string(),
            path: self.config_path.clone(),
        })
    }
}

fn find_single<F>(dir: &Path, what: &str, matches: F) -> ExtractResult<PathBuf>
where
    F: Fn(&str) -> bool,
{
    let entries = fs::read_dir(dir).map_err(|e| ExtractError::io(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::io(dir, e))?;
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if matches(name) && entry.path().is_file() {
                found.push(entry.path());
            }
        }
    }

    if found.len() != 1 {
        return Err(ExtractError::MalformedRunDirectory {
            dir: dir.to_path_buf(),
            what: what.to_string(),
            found: found.len(),
        });
    }
    debug!(path = ?found[0], "found {}", what);
    Ok(found.remove(0))
}

pub fn run_name_from_config(config_path: &Path) -> String {
    let file_name = config_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    file_name
        .strip_suffix(CONFIG_SUFFIX)
        .unwrap_or(file_name)
        .to_string()
}

/// First line whose second space-separated token is `key`; returns the
/// third token with surrounding quotes removed.
pub fn lookup_key_in(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let mut tokens = line.split(' ');
        let _command = tokens.next()?;
        if tokens.next()? != key {
            return None;
        }
        let value = tokens.next()?;
        Some(value.trim_end_matches('\r').trim_matches('"').to_string())
    })
}

/// Second line holds `x_lo, x_hi, y_lo, y_hi` separated by tabs; anything
/// after the fourth field is ignored.
pub fn parse_extents(
    content: &str,
    path: &Path,
    y_convention: YConvention,
) -> ExtractResult<(CellIndex, CellIndex)> {
    let malformed = |reason: String| ExtractError::MalformedExtents {
        path: path.to_path_buf(),
        reason,
    };

    let line = content
        .lines()
        .nth(1)
        .ok_or_else(|| malformed("missing second line".to_string()))?;
    let fields = line
        .split('\t')
        .take(4)
        .map(|f| {
            f.trim()
                .parse::<i64>()
                .map_err(|e| malformed(format!("field {:?}: {}", f.trim(), e)))
        })
        .collect::<ExtractResult<Vec<i64>>>()?;

    let &[x_lo, x_hi, y_lo, y_hi] = fields.as_slice() else {
        return Err(malformed(format!("expected 4 fields, got {}", fields.len())));
    };
    let (y_lo, y_hi) = match y_convention {
        YConvention::Raw => (y_lo, y_hi),
        YConvention::FlipWithConstant { height } => (height - y_hi, height - y_lo),
    };

    Ok((CellIndex::new(x_lo, y_lo), CellIndex::new(x_hi, y_hi)))
}
