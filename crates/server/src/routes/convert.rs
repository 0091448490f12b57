use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header, StatusCode},
    response::Response,
};
use tokio::task::spawn_blocking;
use tokio_util::io::ReaderStream;

use convert_dispatch::ConversionEntry;

use crate::error::{ConvertError, MSG_INVALID_NAME, MSG_MISSING_INPUT};
use crate::storage::{sanitize_filename, RequestStorage};
use crate::AppState;

struct UploadForm {
    file_name: String,
    data: Bytes,
    action: String,
}

// ── POST /convert ─────────────────────────────────────────────────────────────

/// Multipart form with a `file` part and an `action` text part.  Responds
/// with the converted file as an attachment, or a plain-text error.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let expose = state.config.conversion.expose_error_details;
    match handle(&state, multipart).await {
        Ok(resp) => resp,
        Err(e) => e.into_response_with(expose),
    }
}

async fn handle(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    let form = read_form(multipart?).await?;

    let safe_name = sanitize_filename(&form.file_name);
    if safe_name.is_empty() {
        return Err(ConvertError::Validation(MSG_INVALID_NAME.into()));
    }
    // Unsupported pairs are rejected before anything touches the disk.
    let entry = convert_dispatch::resolve(&safe_name, &form.action)?;

    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let storage =
        RequestStorage::create(&state.config.storage, &request_id, &safe_name, &form.data).await?;
    let output_name = entry.output_file_name(&storage.input_stem());
    let output_path = storage.output_path(&output_name);

    tracing::info!(
        "[{request_id}] {} {} ({} bytes)",
        entry.action,
        safe_name,
        form.data.len()
    );
    let started = Instant::now();
    run_converter(
        entry,
        storage.input_path.clone(),
        output_path.clone(),
        state.config.conversion.timeout_secs,
    )
    .await?;
    tracing::info!(
        "[{request_id}] wrote {output_name} in {:.2}s",
        started.elapsed().as_secs_f64()
    );

    stream_file(&output_path, &output_name).await
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ConvertError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut action: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" if file.is_none() => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await?;
                file = Some((file_name, data));
            }
            "action" if action.is_none() => {
                action = Some(field.text().await?);
            }
            _ => {}
        }
    }

    let missing = || ConvertError::Validation(MSG_MISSING_INPUT.into());
    let (file_name, data) = file.filter(|(n, _)| !n.is_empty()).ok_or_else(missing)?;
    let action = action
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(missing)?;
    Ok(UploadForm { file_name, data, action })
}

/// Run the converter on the blocking pool.
async fn run_converter(
    entry: &'static ConversionEntry,
    input: PathBuf,
    output: PathBuf,
    timeout_secs: Option<u64>,
) -> Result<(), ConvertError> {
    run_blocking(
        entry.action.to_string(),
        move || entry.run(&input, &output),
        timeout_secs.map(Duration::from_secs),
    )
    .await
}

/// Run `job` on the blocking pool, waiting at most `limit`.  A timeout stops
/// the wait, not the job thread.
async fn run_blocking<F>(
    label: String,
    job: F,
    limit: Option<Duration>,
) -> Result<(), ConvertError>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let task = spawn_blocking(job);
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(ConvertError::Conversion(anyhow::anyhow!(
                    "{label} timed out after {limit:?}"
                )))
            }
        },
        None => task.await,
    };
    joined
        .unwrap_or_else(|e| Err(anyhow::anyhow!(e)))
        .map_err(ConvertError::Conversion)
}

async fn stream_file(path: &Path, download_name: &str) -> Result<Response, ConvertError> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ConvertError::Conversion(e.into()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use axum::http::Request;
    use tower::ServiceExt;

    use convert_common::config::{ServerAppConfig, StorageConfig};

    use super::*;

    const BOUNDARY: &str = "convert-test-boundary";

    struct Harness {
        _dir: tempfile::TempDir,
        storage: StorageConfig,
        router: axum::Router,
    }

    fn harness_with(tweak: impl FnOnce(&mut ServerAppConfig)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerAppConfig::default();
        config.storage = StorageConfig::under(dir.path());
        tweak(&mut config);
        std::fs::create_dir_all(&config.storage.upload_dir).unwrap();
        std::fs::create_dir_all(&config.storage.output_dir).unwrap();
        let storage = config.storage.clone();
        let router = crate::app(Arc::new(AppState { config }));
        Harness { _dir: dir, storage, router }
    }

    fn harness() -> Harness {
        harness_with(|_| {})
    }

    fn form(file: Option<(&str, &[u8])>, action: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((name, data)) = file {
            write!(
                body,
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .unwrap();
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(action) = action {
            write!(
                body,
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"action\"\r\n\r\n{action}\r\n"
            )
            .unwrap();
        }
        write!(body, "--{BOUNDARY}--\r\n").unwrap();
        body
    }

    fn upload(name: &str, data: &[u8], action: &str) -> Vec<u8> {
        form(Some((name, data)), Some(action))
    }

    async fn post(h: &Harness, body: Vec<u8>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri("/convert")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        let resp = h.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024 * 1024).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    fn disposition(headers: &axum::http::HeaderMap) -> String {
        headers[header::CONTENT_DISPOSITION].to_str().unwrap().to_string()
    }

    /// All regular files under `root`, recursively.
    fn files_under(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let Ok(rd) = std::fs::read_dir(root) else { return out };
        for entry in rd.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(files_under(&path));
            } else {
                out.push(path);
            }
        }
        out
    }

    // ── Fixtures ──────────────────────────────────────────────────────────────

    fn pdf_bytes(text: &str) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("src.txt");
        let pdf = dir.path().join("src.pdf");
        std::fs::write(&txt, text).unwrap();
        convert_dispatch::resolve("src.txt", "txt_to_pdf").unwrap().run(&txt, &pdf).unwrap();
        std::fs::read(pdf).unwrap()
    }

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.docx");
        let blocks: Vec<_> = paragraphs
            .iter()
            .map(|p| convert_office::Block::Paragraph(p.to_string()))
            .collect();
        convert_office::write_docx(&path, None, &blocks).unwrap();
        std::fs::read(path).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 128, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn xlsx_bytes(sheet_rows: &str) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        let parts = [
            ("[Content_Types].xml", r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#),
            ("_rels/.rels", r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
            ("xl/workbook.xml", r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
            ("xl/_rels/workbook.xml.rels", r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#),
        ];
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_rows}</sheetData></worksheet>"#
        );
        let parts = parts.into_iter().chain([("xl/worksheets/sheet1.xml", sheet.as_str())]);
        for (name, body) in parts {
            zip.start_file(name, opts).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Silent MPEG-1 Layer III frames, 128 kbit/s, 44.1 kHz, mono.
    fn mp3_bytes(frames: usize) -> Vec<u8> {
        const FRAME_LEN: usize = 417;
        let mut out = Vec::with_capacity(frames * FRAME_LEN);
        for _ in 0..frames {
            out.extend_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
            out.resize(out.len() + FRAME_LEN - 4, 0);
        }
        out
    }

    // ── Success paths ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_txt_to_pdf() {
        let h = harness();
        let (status, headers, body) =
            post(&h, upload("notes.txt", b"hello\nworld\n", "txt_to_pdf")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"notes_txt_to_pdf.pdf\"");
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert!(body.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_pdf_to_txt() {
        let h = harness();
        let pdf = pdf_bytes("Quarterly figures\n");
        let (status, headers, body) = post(&h, upload("report.pdf", &pdf, "pdf_to_txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"report_pdf_to_txt.txt\"");
        assert!(String::from_utf8_lossy(&body).contains("Quarterly figures"));
    }

    #[tokio::test]
    async fn test_pdf_to_docx() {
        let h = harness();
        let pdf = pdf_bytes("First line\nSecond line\n");
        let (status, headers, body) = post(&h, upload("report.pdf", &pdf, "pdf_to_docx")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"report_pdf_to_docx.docx\"");
        assert!(body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_docx_to_txt() {
        let h = harness();
        let docx = docx_bytes(&["Dear team,", "See attached."]);
        let (status, headers, body) = post(&h, upload("memo.docx", &docx, "docx_to_txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"memo_docx_to_txt.txt\"");
        assert_eq!(String::from_utf8(body).unwrap(), "Dear team,\nSee attached.\n");
    }

    #[tokio::test]
    async fn test_img_to_pdf() {
        let h = harness();
        let png = png_bytes();
        let (status, headers, body) = post(&h, upload("scan.PNG", &png, "img_to_pdf")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"scan_img_to_pdf.pdf\"");
        assert!(body.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_xlsx_to_csv() {
        let h = harness();
        let xlsx = xlsx_bytes(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>id</t></is></c><c r="B1" t="inlineStr"><is><t>city</t></is></c></row><row r="2"><c r="A2"><v>7</v></c><c r="B2" t="inlineStr"><is><t>Oslo</t></is></c></row>"#,
        );
        let (status, headers, body) = post(&h, upload("cities.xlsx", &xlsx, "xlsx_to_csv")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"cities_xlsx_to_csv.csv\"");
        assert_eq!(String::from_utf8(body).unwrap(), "id,city\n7,Oslo\n");
    }

    #[tokio::test]
    async fn test_mp3_to_wav() {
        let h = harness();
        let mp3 = mp3_bytes(20);
        let (status, headers, body) = post(&h, upload("quiet.mp3", &mp3, "mp3_to_wav")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"quiet_mp3_to_wav.wav\"");
        assert_eq!(&body[0..4], b"RIFF");
        assert_eq!(&body[8..12], b"WAVE");
    }

    #[tokio::test]
    async fn test_blank_documents_convert() {
        let h = harness();
        let docx = docx_bytes(&[""]);
        let (status, _, body) = post(&h, upload("blank.docx", &docx, "docx_to_txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"\n");

        let xlsx = xlsx_bytes("");
        let (status, _, body) = post(&h, upload("empty.xlsx", &xlsx, "xlsx_to_csv")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"\n");
    }

    #[tokio::test]
    async fn test_outputs_are_isolated_per_request() {
        let h = harness();
        for text in ["one\n", "two\n"] {
            let (status, _, _) =
                post(&h, upload("same.txt", text.as_bytes(), "txt_to_pdf")).await;
            assert_eq!(status, StatusCode::OK);
        }
        let inputs = files_under(&h.storage.upload_dir);
        let outputs = files_under(&h.storage.output_dir);
        assert_eq!(inputs.len(), 2);
        assert_eq!(outputs.len(), 2);
        assert_ne!(inputs[0].parent(), inputs[1].parent());
        assert!(outputs.iter().all(|p| p.file_name().unwrap() == "same_txt_to_pdf.pdf"));
    }

    #[tokio::test]
    async fn test_traversal_name_is_sanitized() {
        let h = harness();
        let pdf = pdf_bytes("secret\n");
        let (status, headers, _) =
            post(&h, upload("../../etc/passwd.pdf", &pdf, "pdf_to_txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disposition(&headers), "attachment; filename=\"etc_passwd_pdf_to_txt.txt\"");

        let stored = files_under(&h.storage.upload_dir);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_name().unwrap(), "etc_passwd.pdf");
        assert_eq!(stored[0].parent().unwrap().parent().unwrap(), h.storage.upload_dir);
    }

    // ── Rejections ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_missing_file_is_400() {
        let h = harness();
        let (status, _, body) = post(&h, form(None, Some("txt_to_pdf"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, MSG_MISSING_INPUT.as_bytes());
        assert!(files_under(&h.storage.upload_dir).is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_blank_action_is_400() {
        let h = harness();
        for action in [None, Some(""), Some("   ")] {
            let (status, _, body) = post(&h, form(Some(("a.txt", &b"x"[..])), action)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "action={action:?}");
            assert_eq!(body, MSG_MISSING_INPUT.as_bytes());
        }
        assert!(files_under(&h.storage.upload_dir).is_empty());
    }

    #[tokio::test]
    async fn test_empty_filename_is_400() {
        let h = harness();
        let (status, _, body) = post(&h, upload("", b"x", "txt_to_pdf")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, MSG_MISSING_INPUT.as_bytes());
    }

    #[tokio::test]
    async fn test_unsanitizable_filename_is_400() {
        let h = harness();
        let (status, _, body) = post(&h, upload("..", b"x", "txt_to_pdf")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, MSG_INVALID_NAME.as_bytes());
    }

    #[tokio::test]
    async fn test_unsupported_pairs_are_400_and_store_nothing() {
        let h = harness();
        let cases = [
            ("doc.pdf", "img_to_pdf"),
            ("image.gif", "img_to_pdf"),
            ("notes.txt", "nonsense"),
            ("Makefile", "txt_to_pdf"),
        ];
        for (name, action) in cases {
            let (status, _, body) = post(&h, upload(name, b"data", action)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{name} {action}");
            assert_eq!(body, b"Conversion type not supported");
        }
        assert!(files_under(&h.storage.upload_dir).is_empty());
        assert!(files_under(&h.storage.output_dir).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let h = harness_with(|c| c.conversion.max_upload_mb = 1);
        let big = vec![b'a'; 2 * 1024 * 1024];
        let (status, _, _) = post(&h, upload("big.txt", &big, "txt_to_pdf")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(files_under(&h.storage.upload_dir).is_empty());
        assert!(files_under(&h.storage.output_dir).is_empty());
    }

    #[tokio::test]
    async fn test_not_multipart_is_client_error() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/convert")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = h.router.clone().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    // ── Converter failures ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_empty_pdf_is_500_with_details() {
        let h = harness();
        for action in ["pdf_to_txt", "pdf_to_docx"] {
            let (status, _, body) = post(&h, upload("empty.pdf", b"", action)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            let msg = String::from_utf8(body).unwrap();
            assert!(msg.contains(&format!("{action} failed")), "got: {msg}");
            assert!(msg.contains("empty PDF"), "got: {msg}");
        }
        assert!(files_under(&h.storage.output_dir).is_empty());
    }

    #[tokio::test]
    async fn test_failure_details_can_be_hidden() {
        let h = harness_with(|c| c.conversion.expose_error_details = false);
        let (status, _, body) =
            post(&h, upload("broken.docx", b"not a zip", "docx_to_txt")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Conversion failed");
    }

    #[tokio::test]
    async fn test_failed_conversion_leaves_no_output() {
        let h = harness();
        let (status, _, _) =
            post(&h, upload("garbage.png", b"definitely not an image", "img_to_pdf")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(files_under(&h.storage.output_dir).is_empty());
    }

    #[tokio::test]
    async fn test_slow_job_times_out() {
        let err = run_blocking(
            "txt_to_pdf".into(),
            || {
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            },
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("txt_to_pdf timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn test_job_within_limit_succeeds() {
        let limit = Some(Duration::from_secs(5));
        assert!(run_blocking("mp3_to_wav".into(), || Ok(()), limit).await.is_ok());

        let failing = || -> anyhow::Result<()> { anyhow::bail!("decoder gave up") };
        let err = run_blocking("mp3_to_wav".into(), failing, None).await.unwrap_err();
        assert!(err.to_string().contains("decoder gave up"));
    }
}
