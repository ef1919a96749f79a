use anyhow::Context;
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::Path;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10 MB

pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn allowed_file(name: &str) -> bool {
    matches!(file_extension(name), Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

// Reduce an uploaded name to a single safe path component: drop any directory
// parts, keep only [A-Za-z0-9._-], strip leading/trailing dots. Empty result
// means the name was unusable.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches('.').to_string()
}

// Stored name: date prefix plus a short random tag, e.g. 260807_x3Fq9.png
pub fn random_name(ext: &str) -> String {
    let tag: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    format!("{}_{}.{}", Utc::now().format("%y%m%d"), tag, ext)
}

pub fn content_type_for(name: &str) -> &'static str {
    match file_extension(name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub fn count_images(img_dir: &Path) -> usize {
    std::fs::read_dir(img_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .count()
        })
        .unwrap_or(0)
}

// Newest-mtime-first page of stored image names
pub fn list_images_by_mtime(
    img_dir: &Path,
    page: i64,
    per_page: usize,
) -> anyhow::Result<Vec<String>> {
    if !img_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(std::time::SystemTime, String)> = Vec::new();
    for entry in std::fs::read_dir(img_dir).context("read media directory")? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let mtime = entry
            .metadata()?
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        files.push((mtime, name.to_string()));
    }
    files.sort_by(|a, b| b.0.cmp(&a.0));

    let page = page.max(1) as usize;
    let start = (page - 1) * per_page;
    Ok(files
        .into_iter()
        .skip(start)
        .take(per_page)
        .map(|(_, name)| name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list() {
        assert!(allowed_file("photo.PNG"));
        assert!(allowed_file("a.b.webp"));
        assert!(!allowed_file("archive.zip"));
        assert!(!allowed_file("noextension"));
        assert!(!allowed_file("trailing."));
    }

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("a b?.png"), "a_b_.png");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("ok-name_1.jpg"), "ok-name_1.jpg");
    }

    #[test]
    fn random_names_carry_the_extension() {
        let name = random_name("png");
        assert!(name.ends_with(".png"));
        assert_ne!(random_name("png"), random_name("png"));
    }

    #[test]
    fn mtime_listing_pages() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.png")), [i as u8]).unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let all = list_images_by_mtime(dir.path(), 1, 20).unwrap();
        assert_eq!(all.len(), 5);

        let page2 = list_images_by_mtime(dir.path(), 2, 3).unwrap();
        assert_eq!(page2.len(), 2);

        assert_eq!(count_images(dir.path()), 5);
        assert!(list_images_by_mtime(&dir.path().join("missing"), 1, 20).unwrap().is_empty());
    }
}
