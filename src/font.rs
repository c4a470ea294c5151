use crate::error::ContractError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SCRIPT_FAMILY_FILES: &[&str] = &[
    "DancingScript-Regular.ttf",
    "DancingScript[wght].ttf",
    "GreatVibes-Regular.ttf",
    "BRUSHSCI.TTF",
    "Brush Script.ttf",
    "segoesc.ttf",
    "LHANDW.TTF",
    "z003-mediumitalic.otf",
    "Z003-MediumItalic.otf",
    "URWChanceryL-MediItal.otf",
];

const SANS_FALLBACK_FILES: &[&str] = &[
    "DejaVuSans-Oblique.ttf",
    "LiberationSans-Italic.ttf",
    "NotoSans-Italic.ttf",
    "ariali.ttf",
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "NotoSans-Regular.ttf",
    "arial.ttf",
    "Helvetica.ttc",
];

const MAX_DIR_DEPTH: usize = 4;

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Arc<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SignatureFace {
    pub name: String,
    pub data: Arc<Vec<u8>>,
    pub synthetic_oblique: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
}

impl FontRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.fonts.len()
    }

    pub(crate) fn register_dir(&mut self, path: impl AsRef<Path>) {
        for file in font_files_under(path.as_ref(), MAX_DIR_DEPTH) {
            self.register_file(file);
        }
    }

    pub(crate) fn register_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if !has_font_extension(path) {
            return;
        }
        let Ok(data) = fs::read(path) else {
            tracing::debug!(path = %path.display(), "font file unreadable");
            return;
        };
        let name = path.file_stem().and_then(|v| v.to_str()).unwrap_or("EmbeddedFont");
        if let Err(err) = self.register_bytes(data, Some(name)) {
            tracing::debug!(path = %path.display(), error = %err, "font file skipped");
        }
    }

    pub(crate) fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, ContractError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(ContractError::InvalidConfiguration(format!(
                "invalid font data for {source}"
            )));
        };
        let (name, aliases) = font_names(&face, source);
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data: Arc::new(data),
        });
        for alias in std::iter::once(name.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        Ok(name)
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        self.lookup
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    pub(crate) fn signature_face(&self, preferred: Option<&str>, allow_system: bool) -> Option<SignatureFace> {
        let registered = preferred
            .and_then(|name| self.resolve(name))
            .or_else(|| self.fonts.first());
        if let Some(font) = registered {
            return Some(SignatureFace {
                name: font.name.clone(),
                data: Arc::clone(&font.data),
                synthetic_oblique: false,
            });
        }
        if !allow_system {
            return None;
        }
        let dirs = system_font_dirs();
        if let Some((name, data)) = find_font_file(&dirs, SCRIPT_FAMILY_FILES) {
            return Some(SignatureFace {
                name,
                data,
                synthetic_oblique: false,
            });
        }
        find_font_file(&dirs, SANS_FALLBACK_FILES).map(|(name, data)| SignatureFace {
            synthetic_oblique: !name.to_ascii_lowercase().contains("italic")
                && !name.to_ascii_lowercase().contains("oblique"),
            name,
            data,
        })
    }
}

fn has_font_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc")
}

fn font_files_under(root: &Path, depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(root) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if depth > 0 {
                out.extend(font_files_under(&path, depth - 1));
            }
        } else if has_font_extension(&path) {
            out.push(path);
        }
    }
    out.sort();
    out
}

fn find_font_file(dirs: &[PathBuf], candidates: &[&str]) -> Option<(String, Arc<Vec<u8>>)> {
    let files: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| font_files_under(dir, MAX_DIR_DEPTH))
        .collect();
    for candidate in candidates {
        let wanted = candidate.to_ascii_lowercase();
        let hit = files.iter().find(|path| {
            path.file_name()
                .and_then(|v| v.to_str())
                .is_some_and(|name| name.to_ascii_lowercase() == wanted)
        });
        let Some(path) = hit else {
            continue;
        };
        let Ok(bytes) = fs::read(path) else {
            continue;
        };
        if ttf_parser::Face::parse(&bytes, 0).is_ok() {
            let name = path
                .file_stem()
                .and_then(|v| v.to_str())
                .unwrap_or(*candidate)
                .to_string();
            return Some((name, Arc::new(bytes)));
        }
    }
    None
}

pub(crate) fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".fonts"));
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("CONTRACT_OVERLAY_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    dirs
}

fn font_names(face: &ttf_parser::Face<'_>, source: &str) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        let slot = match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => &mut family,
            name_id::FULL_NAME => &mut full,
            name_id::POST_SCRIPT_NAME => &mut post,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(name);
        }
    }

    let stem = Path::new(source)
        .file_stem()
        .and_then(|v| v.to_str())
        .map(str::to_string);
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());
    let aliases = [family, full, post, stem]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();
    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(b"definitely not a font".to_vec(), Some("Broken.ttf"))
            .expect_err("invalid");
        assert!(err.to_string().contains("invalid font data for Broken.ttf"));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn non_font_files_are_ignored() {
        let dir = std::env::temp_dir().join(format!("contract-overlay-fonts-{}", std::process::id()));
        fs::create_dir_all(dir.join("nested")).expect("mkdir");
        fs::write(dir.join("readme.txt"), b"hello").expect("write");
        fs::write(dir.join("nested").join("Fake.ttf"), b"not a font").expect("write");
        let mut registry = FontRegistry::new();
        registry.register_dir(&dir);
        assert_eq!(registry.len(), 0);
        assert_eq!(font_files_under(&dir, MAX_DIR_DEPTH).len(), 1);
        assert!(font_files_under(&dir, 0).is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn registered_font_wins_without_system_lookup() {
        let registry = FontRegistry::new();
        assert!(registry.signature_face(Some("Anything"), false).is_none());
    }

    #[test]
    fn names_normalize_quotes_and_case() {
        assert_eq!(normalize_name("  'Dancing Script' "), "dancing script");
        assert_eq!(normalize_name("\"GreatVibes\""), "greatvibes");
    }
}
