use std::{
    collections::HashMap,
    io,
    path::{Component, Path, PathBuf},
};

use axum::{extract::Multipart, http::StatusCode};
use bytes::Bytes;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::warn;

/// Hard ceiling for a public article upload.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Upper bound on `_<n>` suffixes tried for one stored name.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Public URL prefix under which the upload root is served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Result type used by the shared upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when parsing or persisting uploaded files.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("request body exceeds the upload limit")]
    PayloadTooLarge,
    #[error("malformed multipart form: {0}")]
    Malformed(String),
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("failed to write upload to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Describes how stored filenames should be generated for an upload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNaming {
    /// Keep the sanitized original filename.
    PreserveOriginal,
    /// Transliterate the given title into `<base>_<unix-ts><ext>`,
    /// falling back to `fallback` when nothing usable is left.
    TitleTimestamped { fallback: &'static str },
}

/// What to do when a file of this kind cannot be validated or saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Abort the whole request.
    Reject,
    /// Carry on without the file; the stored path stays empty.
    LeaveEmpty,
}

/// Per-kind upload rules. Article submissions are strict, collection assets are best-effort.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub subdir: &'static str,
    /// Lower-case extensions with the leading dot. Empty accepts anything.
    pub allowed_extensions: &'static [&'static str],
    pub max_bytes: Option<usize>,
    pub naming: FileNaming,
    pub on_failure: FailureMode,
}

pub const ARTICLE_POLICY: UploadPolicy = UploadPolicy {
    subdir: "articles",
    allowed_extensions: &[".pdf", ".docx", ".odt"],
    max_bytes: Some(MAX_UPLOAD_BYTES),
    naming: FileNaming::TitleTimestamped { fallback: "article" },
    on_failure: FailureMode::Reject,
};

pub const COVER_POLICY: UploadPolicy = UploadPolicy {
    subdir: "covers",
    allowed_extensions: &[],
    max_bytes: None,
    naming: FileNaming::PreserveOriginal,
    on_failure: FailureMode::LeaveEmpty,
};

pub const COLLECTION_PDF_POLICY: UploadPolicy = UploadPolicy {
    subdir: "pdfs",
    allowed_extensions: &[],
    max_bytes: None,
    naming: FileNaming::PreserveOriginal,
    on_failure: FailureMode::LeaveEmpty,
};

impl UploadPolicy {
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty()
            || self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    pub fn exceeds_size(&self, size: usize) -> bool {
        self.max_bytes.is_some_and(|max| size > max)
    }
}

/// A file received in a multipart form, held in memory until it is stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub original_name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn extension(&self) -> String {
        extension_of(&self.original_name)
    }
}

/// Text fields and files of a parsed multipart form.
#[derive(Debug, Default)]
pub struct FormOutcome {
    pub files: Vec<UploadedFile>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl FormOutcome {
    pub fn first_file(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.field_name == field_name)
    }

    pub fn take_file(&mut self, field_name: &str) -> Option<UploadedFile> {
        let index = self
            .files
            .iter()
            .position(|file| file.field_name == field_name)?;
        Some(self.files.remove(index))
    }

    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .and_then(|values| values.first().map(|s| s.as_str()))
    }

    /// Trimmed text value, `""` when the field is absent.
    pub fn trimmed(&self, field_name: &str) -> &str {
        self.first_text(field_name).map(str::trim).unwrap_or("")
    }
}

/// A file written under the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub disk_path: PathBuf,
    /// Server-relative path with a leading `/`, e.g. `/uploads/articles/x.pdf`.
    pub web_path: String,
}

/// Reads every field of a multipart form. Files are buffered; an empty file
/// input (no bytes, no name) is treated as absent.
pub async fn read_upload_form(mut multipart: Multipart) -> UploadResult<FormOutcome> {
    let mut outcome = FormOutcome::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await.map_err(multipart_error)?;
            outcome
                .text_fields
                .entry(field_name)
                .or_default()
                .push(value);
            continue;
        };

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if file_name.is_empty() && bytes.is_empty() {
            continue;
        }

        outcome.files.push(UploadedFile {
            field_name,
            original_name: file_name,
            bytes,
        });
    }

    Ok(outcome)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::PayloadTooLarge
    } else {
        UploadError::Malformed(err.body_text())
    }
}

/// Ensures the destination directory exists.
pub async fn ensure_directory(path: &Path) -> UploadResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes `file` under `<upload_root>/<policy.subdir>` using the policy's naming rule.
///
/// `title` feeds [`FileNaming::TitleTimestamped`]; `timestamp` is the unix time used in
/// the generated name. Extension and size checks are the caller's job.
pub async fn store_upload(
    upload_root: &Path,
    policy: &UploadPolicy,
    file: &UploadedFile,
    title: &str,
    timestamp: i64,
) -> UploadResult<StoredFile> {
    let dir = upload_root.join(policy.subdir);
    ensure_directory(&dir).await?;

    let stored_name = build_stored_name(policy.naming, &file.original_name, title, timestamp);
    let (stored_name, mut out) = create_unique(&dir, &stored_name).await?;
    let disk_path = dir.join(&stored_name);

    let write = async {
        out.write_all(&file.bytes).await?;
        out.flush().await
    };
    if let Err(source) = write.await {
        if let Err(cleanup) = tokio::fs::remove_file(&disk_path).await {
            warn!(?cleanup, file = %disk_path.display(), "failed to remove partial upload");
        }
        return Err(UploadError::Io {
            path: disk_path,
            source,
        });
    }

    Ok(StoredFile {
        web_path: format!("{UPLOADS_URL_PREFIX}/{}/{stored_name}", policy.subdir),
        disk_path,
    })
}

/// Creates `stored_name` inside `dir` without touching existing files. When the name
/// is taken, `_1`, `_2`, ... is inserted before the extension.
async fn create_unique(dir: &Path, stored_name: &str) -> UploadResult<(String, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = numbered_name(stored_name, attempt);
        let path = dir.join(&candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(out) => return Ok((candidate, out)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(UploadError::Io { path, source }),
        }
    }

    Err(UploadError::Io {
        path: dir.join(stored_name),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "no free file name left"),
    })
}

fn numbered_name(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{attempt}{}", &name[..dot], &name[dot..]),
        _ => format!("{name}_{attempt}"),
    }
}

/// Stores an optional asset according to `policy.on_failure`.
///
/// With [`FailureMode::LeaveEmpty`] any rejection or write failure is logged and
/// yields `Ok(None)`; with [`FailureMode::Reject`] it is returned to the caller.
pub async fn store_asset(
    upload_root: &Path,
    policy: &UploadPolicy,
    file: Option<&UploadedFile>,
    timestamp: i64,
) -> UploadResult<Option<StoredFile>> {
    let Some(file) = file else {
        return Ok(None);
    };

    let outcome = if !policy.allows_extension(&file.extension()) {
        Err(UploadError::Rejected(format!(
            "extension `{}` is not allowed",
            file.extension()
        )))
    } else if policy.exceeds_size(file.size()) {
        Err(UploadError::PayloadTooLarge)
    } else {
        store_upload(upload_root, policy, file, "", timestamp).await
    };

    match (outcome, policy.on_failure) {
        (Ok(stored), _) => Ok(Some(stored)),
        (Err(err), FailureMode::LeaveEmpty) => {
            warn!(?err, subdir = policy.subdir, "asset upload skipped");
            Ok(None)
        }
        (Err(err), FailureMode::Reject) => Err(err),
    }
}

fn build_stored_name(naming: FileNaming, original_name: &str, title: &str, timestamp: i64) -> String {
    match naming {
        FileNaming::PreserveOriginal => {
            let base = Path::new(original_name)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("");
            let sanitized = sanitize_filename::sanitize(base);
            if sanitized.is_empty() || sanitized.starts_with('.') {
                format!("file_{timestamp}{}", extension_of(original_name))
            } else {
                sanitized
            }
        }
        FileNaming::TitleTimestamped { fallback } => {
            let mut base = safe_base_name(title);
            if base.is_empty() {
                base = fallback.to_string();
            }
            format!("{base}_{timestamp}{}", extension_of(original_name))
        }
    }
}

/// Lower-case extension including the leading dot, or `""`.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn transliterate(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "c",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' | 'ь' => "",
        'ы' => "y",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(latin)
}

/// Derives a filesystem-safe base name from a free-form title.
///
/// Cyrillic is transliterated, everything is lower-cased, runs of whitespace,
/// `_` and `-` collapse into one `_`, and all other characters are dropped.
/// The result only contains `[a-z0-9_]` and has no leading or trailing `_`.
pub fn safe_base_name(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_separator = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        let mut buf = [0u8; 4];
        let piece: &str;
        if let Some(latin) = transliterate(ch) {
            piece = latin;
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            piece = ch.encode_utf8(&mut buf);
        } else if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_separator = true;
            continue;
        } else {
            continue;
        }

        if piece.is_empty() {
            continue;
        }
        if pending_separator && !out.is_empty() {
            out.push('_');
        }
        pending_separator = false;
        out.push_str(piece);
    }

    out
}

/// Maps a stored server-relative path (`/uploads/...`) back to a file under `upload_root`.
///
/// Paths outside the uploads prefix or containing `..` are refused.
pub fn resolve_stored_path(upload_root: &Path, web_path: &str) -> Option<PathBuf> {
    let relative = web_path
        .trim_start_matches('/')
        .strip_prefix(UPLOADS_URL_PREFIX.trim_start_matches('/'))?
        .strip_prefix('/')?;

    let relative = Path::new(relative);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }

    Some(upload_root.join(relative))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, extract::FromRequest, http::Request};
    use tempfile::tempdir;

    use super::*;

    fn file(name: &str, bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            field_name: "file".into(),
            original_name: name.into(),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn transliterates_cyrillic_titles() {
        assert_eq!(safe_base_name("Новая статья"), "novaya_statya");
        assert_eq!(safe_base_name("Щука и ёж"), "shchuka_i_ezh");
        assert_eq!(safe_base_name("Объявление"), "obyavlenie");
    }

    #[test]
    fn collapses_separator_runs_and_strips_everything_else() {
        assert_eq!(safe_base_name("  Hello -- World__2024  "), "hello_world_2024");
        assert_eq!(safe_base_name("C++ & Rust!"), "c_rust");
        assert_eq!(safe_base_name("Тест: «кавычки» (1)"), "test_kavychki_1");
    }

    #[test]
    fn empty_base_name_when_nothing_usable() {
        assert_eq!(safe_base_name(""), "");
        assert_eq!(safe_base_name("!!! ??? ъь"), "");
        assert_eq!(safe_base_name("中文标题"), "");
    }

    #[test]
    fn derived_names_only_use_safe_ascii() {
        let titles = [
            "Новая статья",
            "ЖИЗНЬ и Судьба — роман",
            "Ёлка/../../etc/passwd",
            "Съешь же ещё этих мягких французских булок, да выпей чаю",
            "Mixed Кириллица and Latin 42",
        ];
        for title in titles {
            let base = safe_base_name(title);
            assert!(!base.is_empty(), "{title}");
            assert!(
                base.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'),
                "{title} -> {base}"
            );
        }
    }

    #[test]
    fn title_naming_uses_fallback_and_timestamp() {
        let naming = FileNaming::TitleTimestamped { fallback: "article" };
        assert_eq!(
            build_stored_name(naming, "doc.PDF", "Новая статья", 1700000000),
            "novaya_statya_1700000000.pdf"
        );
        assert_eq!(
            build_stored_name(naming, "doc.odt", "???", 5),
            "article_5.odt"
        );
    }

    #[test]
    fn preserve_naming_sanitizes_original() {
        let naming = FileNaming::PreserveOriginal;
        assert_eq!(build_stored_name(naming, "cover.jpg", "", 0), "cover.jpg");
        assert_eq!(
            build_stored_name(naming, "../../secret.pdf", "", 0),
            "secret.pdf"
        );
        assert_eq!(build_stored_name(naming, "a:b?.png", "", 0), "ab.png");
    }

    #[test]
    fn extension_is_lowercase_with_dot() {
        assert_eq!(extension_of("Report.DOCX"), ".docx");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn article_policy_is_strict_and_assets_are_lenient() {
        assert!(ARTICLE_POLICY.allows_extension(".pdf"));
        assert!(ARTICLE_POLICY.allows_extension(".ODT"));
        assert!(!ARTICLE_POLICY.allows_extension(".txt"));
        assert!(ARTICLE_POLICY.exceeds_size(MAX_UPLOAD_BYTES + 1));
        assert!(!ARTICLE_POLICY.exceeds_size(MAX_UPLOAD_BYTES));
        assert_eq!(ARTICLE_POLICY.on_failure, FailureMode::Reject);

        assert!(COVER_POLICY.allows_extension(".txt"));
        assert!(!COVER_POLICY.exceeds_size(usize::MAX));
        assert_eq!(COVER_POLICY.on_failure, FailureMode::LeaveEmpty);
        assert_eq!(COLLECTION_PDF_POLICY.on_failure, FailureMode::LeaveEmpty);
    }

    #[tokio::test]
    async fn store_upload_writes_bytes_and_web_path() {
        let root = tempdir().expect("temp dir");
        let upload = file("doc.pdf", b"%PDF-1.4 body");

        let stored = store_upload(root.path(), &ARTICLE_POLICY, &upload, "Новая статья", 42)
            .await
            .expect("stored");

        assert_eq!(stored.web_path, "/uploads/articles/novaya_statya_42.pdf");
        assert_eq!(stored.disk_path, root.path().join("articles/novaya_statya_42.pdf"));
        let written = std::fs::read(&stored.disk_path).expect("read back");
        assert_eq!(written, b"%PDF-1.4 body");
    }

    #[test]
    fn numbered_names_keep_the_extension() {
        assert_eq!(numbered_name("cover.jpg", 0), "cover.jpg");
        assert_eq!(numbered_name("cover.jpg", 2), "cover_2.jpg");
        assert_eq!(numbered_name("README", 1), "README_1");
        assert_eq!(numbered_name(".hidden", 1), ".hidden_1");
    }

    #[tokio::test]
    async fn colliding_names_never_overwrite_existing_files() {
        let root = tempdir().expect("temp dir");
        let first = file("doc.pdf", b"FIRST");
        let second = file("doc.pdf", b"SECOND");

        let a = store_upload(root.path(), &ARTICLE_POLICY, &first, "Новая статья", 7)
            .await
            .expect("first stored");
        let b = store_upload(root.path(), &ARTICLE_POLICY, &second, "Новая статья", 7)
            .await
            .expect("second stored");

        assert_eq!(a.web_path, "/uploads/articles/novaya_statya_7.pdf");
        assert_eq!(b.web_path, "/uploads/articles/novaya_statya_7_1.pdf");
        assert_eq!(std::fs::read(&a.disk_path).unwrap(), b"FIRST");
        assert_eq!(std::fs::read(&b.disk_path).unwrap(), b"SECOND");
    }

    #[tokio::test]
    async fn same_cover_name_for_two_collections_keeps_both() {
        let root = tempdir().expect("temp dir");
        let one = file("cover.jpg", b"one");
        let two = file("cover.jpg", b"two");

        let a = store_asset(root.path(), &COVER_POLICY, Some(&one), 1)
            .await
            .unwrap()
            .expect("first cover");
        let b = store_asset(root.path(), &COVER_POLICY, Some(&two), 1)
            .await
            .unwrap()
            .expect("second cover");

        assert_eq!(a.web_path, "/uploads/covers/cover.jpg");
        assert_eq!(b.web_path, "/uploads/covers/cover_1.jpg");
        assert_eq!(std::fs::read(&a.disk_path).unwrap(), b"one");
        assert_eq!(std::fs::read(&b.disk_path).unwrap(), b"two");
    }

    #[tokio::test]
    async fn lenient_assets_are_skipped_on_failure() {
        let root = tempdir().expect("temp dir");
        // A regular file where the `covers` directory should be makes the save fail.
        std::fs::write(root.path().join("covers"), b"blocker").expect("blocker");

        let cover = file("cover.png", b"png");
        let skipped = store_asset(root.path(), &COVER_POLICY, Some(&cover), 1)
            .await
            .expect("lenient policy never errors");
        assert!(skipped.is_none());
        let absent = store_asset(root.path(), &COLLECTION_PDF_POLICY, None, 1)
            .await
            .expect("absent file");
        assert!(absent.is_none());

        let pdf = file("issue.pdf", b"pdf");
        let stored = store_asset(root.path(), &COLLECTION_PDF_POLICY, Some(&pdf), 1)
            .await
            .expect("no error")
            .expect("pdf stored");
        assert_eq!(stored.web_path, "/uploads/pdfs/issue.pdf");
    }

    #[tokio::test]
    async fn strict_assets_surface_rejections() {
        let root = tempdir().expect("temp dir");
        let notes = file("notes.txt", b"text");

        let err = store_asset(root.path(), &ARTICLE_POLICY, Some(&notes), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Rejected(_)));
        assert!(!root.path().join("articles").exists());
    }

    #[test]
    fn resolves_stored_paths_inside_upload_root() {
        let root = Path::new("/srv/uploads");
        assert_eq!(
            resolve_stored_path(root, "/uploads/articles/a_1.pdf"),
            Some(PathBuf::from("/srv/uploads/articles/a_1.pdf"))
        );
        assert_eq!(
            resolve_stored_path(root, "uploads/articles/a_1.pdf"),
            Some(PathBuf::from("/srv/uploads/articles/a_1.pdf"))
        );
        assert_eq!(resolve_stored_path(root, "/uploads/../etc/passwd"), None);
        assert_eq!(resolve_stored_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_stored_path(root, "/uploadsX/a.pdf"), None);
    }

    #[tokio::test]
    async fn reads_text_fields_and_files_from_multipart() {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"author\"\r\n\r\nИван Петров\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"doc.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n%PDF-data\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"cover\"; filename=\"\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\r\n\
             --{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request");

        let multipart = Multipart::from_request(request, &()).await.expect("multipart");
        let mut form = read_upload_form(multipart).await.expect("form");

        assert_eq!(form.trimmed("author"), "Иван Петров");
        assert_eq!(form.trimmed("missing"), "");
        assert!(form.first_file("cover").is_none());
        let upload = form.take_file("file").expect("file part");
        assert_eq!(upload.original_name, "doc.pdf");
        assert_eq!(&upload.bytes[..], b"%PDF-data");
        assert!(form.take_file("file").is_none());
    }
}
