//! HTML pages for the upload form, the detection result and errors.

use crate::{detection::Detection, pipeline::PipelineOutput};

pub const UPLOADS_ROUTE: &str = "/static/uploads";
pub const OUTPUTS_ROUTE: &str = "/static/outputs";

const STYLE: &str = r#"
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 2rem auto; max-width: 1100px; color: #222; }
        .images { display: flex; gap: 1.5rem; flex-wrap: wrap; }
        .images figure { margin: 0; flex: 1 1 45%; }
        .images img { max-width: 100%; border: 1px solid #ccc; }
        table { border-collapse: collapse; margin-top: 1.5rem; width: 100%; }
        th, td { border: 1px solid #ccc; padding: 0.4rem 0.6rem; text-align: left; }
        th { background: #f3f3f3; }
        .error { color: #a00; }
"#;

pub fn escape_html(input: &str) -> String {
    html_escape::encode_text(input).into_owned()
}

fn escape_attribute(input: &str) -> String {
    html_escape::encode_double_quoted_attribute(input).into_owned()
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape_html(title),
    )
}

pub fn render_index() -> String {
    page(
        "Object Detection",
        r#"    <h1>Object Detection</h1>
    <p>Upload a JPEG or PNG image to detect objects.</p>
    <form action="/predict" method="post" enctype="multipart/form-data">
        <input type="file" name="file" accept="image/png,image/jpeg" required>
        <button type="submit">Detect</button>
    </form>"#,
    )
}

/// One table row; confidence to 2 decimals, box corners as integer pixels.
fn render_detection_row(index: usize, detection: &Detection) -> String {
    let [x1, y1, x2, y2] = detection.bbox.to_pixels();
    format!(
        "            <tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
        index + 1,
        escape_html(&detection.class_name),
        detection.confidence,
        x1,
        y1,
        x2,
        y2
    )
}

pub fn render_result(output: &PipelineOutput) -> String {
    let mut rows = String::new();
    for (i, detection) in output.result.detections.iter().enumerate() {
        rows.push_str(&render_detection_row(i, detection));
    }
    if rows.is_empty() {
        rows.push_str("            <tr><td colspan=\"7\">No objects detected.</td></tr>\n");
    }

    let body = format!(
        r#"    <h1>Detection Result</h1>
    <div class="images">
        <figure>
            <figcaption>Uploaded image</figcaption>
            <img src="{uploads}/{uploaded}" alt="Uploaded image">
        </figure>
        <figure>
            <figcaption>Detected objects</figcaption>
            <img src="{outputs}/{predicted}" alt="Annotated image">
        </figure>
    </div>
    <table>
        <thead>
            <tr><th>#</th><th>Class</th><th>Confidence</th><th>x1</th><th>y1</th><th>x2</th><th>y2</th></tr>
        </thead>
        <tbody>
{rows}        </tbody>
    </table>
    <p><a href="/">Upload another image</a></p>"#,
        uploads = UPLOADS_ROUTE,
        uploaded = escape_attribute(&output.record.file_name()),
        outputs = OUTPUTS_ROUTE,
        predicted = escape_attribute(&output.artifact.file_name),
    );

    page("Detection Result", &body)
}

pub fn render_error(status: u16, message: &str) -> String {
    let body = format!(
        r#"    <h1>Detection failed</h1>
    <p class="error">{status}: {message}</p>
    <p><a href="/">Back to upload</a></p>"#,
        message = escape_html(message),
    );
    page("Detection failed", &body)
}
