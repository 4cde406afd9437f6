use std::path::{Path, PathBuf};

use anyhow::Context;

use super::entry::HistoryEntry;

const FILE_STEM_PROMPT_CHARS: usize = 30;

/// `generated_<prompt slug>.jpg`, with `_<n>` appended when an entry holds
/// more than one image.
pub fn download_file_name(prompt: &str, index: usize, total: usize) -> String {
    let slug: String = prompt
        .chars()
        .take(FILE_STEM_PROMPT_CHARS)
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let slug = if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    };
    if total > 1 {
        format!("generated_{slug}_{}.jpg", index + 1)
    } else {
        format!("generated_{slug}.jpg")
    }
}

pub fn export_entry(entry: &HistoryEntry, out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let total = entry.images().len();
    let mut written = Vec::with_capacity(total);
    for (index, image) in entry.images().iter().enumerate() {
        let path = out_dir.join(download_file_name(entry.options().prompt(), index, total));
        let bytes = image
            .decode()
            .with_context(|| format!("image {} of {} is not valid base64", index + 1, entry.id()))?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ImagePayload;
    use crate::options::{GenerationOptions, OptionUpdate};

    #[test]
    fn file_name_slugs_prompt() {
        assert_eq!(
            download_file_name("A Red Fox!", 0, 1),
            "generated_a_red_fox_.jpg"
        );
        assert_eq!(download_file_name("", 0, 1), "generated_image.jpg");
        assert_eq!(
            download_file_name("fox", 1, 2),
            "generated_fox_2.jpg"
        );
        let long = "abcdefghijklmnopqrstuvwxyz0123456789";
        assert_eq!(
            download_file_name(long, 0, 1),
            "generated_abcdefghijklmnopqrstuvwxyz0123.jpg"
        );
    }

    #[test]
    fn export_writes_decoded_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut options = GenerationOptions::default();
        options.apply(OptionUpdate::Prompt("fox".into()))?;
        let entry = HistoryEntry::new(
            "gen_1",
            1,
            options,
            vec![
                ImagePayload::from_bytes(b"one"),
                ImagePayload::from_bytes(b"two"),
            ],
        );
        let written = export_entry(&entry, &temp.path().join("out"))?;
        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read(&written[0])?, b"one");
        assert!(written[1].ends_with("generated_fox_2.jpg"));
        Ok(())
    }
}
