use lumen_contracts::history::{format_time_ago, HistoryEntry};
use lumen_contracts::options::GenerationOptions;
use lumen_engine::{Gallery, HistoryRow};

pub const NOTICE_TEXT: &str = "Notice: images are generated by a hosted model and kept in local history only. Type /dismiss to hide this message.";
pub const MISSING_KEY_TEXT: &str = "API key missing: set API_KEY (or GEMINI_API_KEY / GOOGLE_API_KEY), or start with --dryrun. Generation is disabled.";

pub fn options_lines(options: &GenerationOptions) -> Vec<String> {
    let reference = match options.reference_image() {
        Some(image) => format!("{} ({} bytes)", image.mime_type, image.decoded_len()),
        None => "none".to_string(),
    };
    vec![
        format!("prompt:    {}", display_or_dash(options.prompt())),
        format!("aspect:    {}", options.aspect_ratio()),
        format!("count:     {}", options.number_of_images()),
        format!("style:     {}", options.style_preset()),
        format!("negative:  {}", display_or_dash(options.negative_prompt())),
        format!("seed:      {}", options.seed().unwrap_or("-")),
        format!("reference: {reference}"),
    ]
}

pub fn history_lines(rows: &[HistoryRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["No history yet.".to_string()];
    }
    rows.iter()
        .map(|row| {
            format!(
                "{} {}  {:>9}  {} image{}  {}",
                if row.selected { "*" } else { " " },
                row.id,
                row.age,
                row.image_count,
                if row.image_count == 1 { "" } else { "s" },
                row.title
            )
        })
        .collect()
}

pub fn gallery_line(gallery: &Gallery) -> String {
    match gallery {
        Gallery::Loading { placeholders } => format!("Generating {placeholders} image(s)..."),
        Gallery::Error(message) => format!("Error: {message}"),
        Gallery::Images { entry_id, images } => {
            format!("Showing {entry_id}: {} image(s)", images.len())
        }
        Gallery::Empty => "No images yet. Enter a prompt to generate.".to_string(),
    }
}

pub fn entry_lines(entry: &HistoryEntry, now_ms: i64) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", entry.id()),
        format!("created:   {}", format_time_ago(entry.timestamp(), now_ms)),
        format!("images:    {}", entry.images().len()),
    ];
    lines.extend(options_lines(entry.options()));
    lines
}

fn display_or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
