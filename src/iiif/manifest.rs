//! IIIF Presentation manifest parsing
//!
//! Accepts both Presentation API 2 (`sequences[0].canvases[].images[].resource`)
//! and 3 (`items[].items[].items[].body`). Canvases without an image service
//! are skipped.

use serde::Serialize;
use serde_json::Value;

use super::urls::image_id_from_service;

/// One page of a manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPage {
    /// 1-based page number in canvas order
    pub page_number: usize,
    pub label: String,
    /// Image service id (Image API base URL)
    pub service_id: String,
    /// Archive image id extracted from the service id
    pub image_id: String,
    pub width: u64,
    pub height: u64,
}

/// Extract pages from a manifest
pub fn parse_manifest_pages(manifest: &Value) -> Vec<ManifestPage> {
    let canvases = match manifest.get("sequences") {
        Some(sequences) => sequences
            .get(0)
            .and_then(|s| s.get("canvases"))
            .and_then(Value::as_array),
        None => manifest.get("items").and_then(Value::as_array),
    };

    let Some(canvases) = canvases else {
        tracing::debug!("Manifest has no canvases");
        return Vec::new();
    };

    canvases
        .iter()
        .enumerate()
        .filter_map(|(idx, canvas)| {
            let Some((service_id, resource)) = image_service(canvas) else {
                tracing::debug!(canvas = idx, "Skipping canvas without image service");
                return None;
            };
            let label = canvas.get("label").map(extract_label).unwrap_or_default();
            let width = canvas
                .get("width")
                .and_then(Value::as_u64)
                .or_else(|| resource.get("width").and_then(Value::as_u64))
                .unwrap_or(0);
            let height = canvas
                .get("height")
                .and_then(Value::as_u64)
                .or_else(|| resource.get("height").and_then(Value::as_u64))
                .unwrap_or(0);

            Some(ManifestPage {
                page_number: idx + 1,
                label: if label.is_empty() {
                    format!("Page {}", idx + 1)
                } else {
                    label
                },
                image_id: image_id_from_service(&service_id),
                service_id,
                width,
                height,
            })
        })
        .collect()
}

/// Manifest title, if it has a non-empty label
pub fn manifest_title(manifest: &Value) -> Option<String> {
    manifest
        .get("label")
        .map(extract_label)
        .filter(|l| !l.is_empty())
}

/// String form of a label in any of the IIIF label shapes
///
/// Plain string, Presentation 3 language map (`{"en": ["Page 1"]}`),
/// or a list of strings / `@value` objects.
pub fn extract_label(label: &Value) -> String {
    match label {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(v)) = map.get("@value") {
                return v.clone();
            }
            map.values()
                .filter_map(Value::as_array)
                .find_map(|values| values.first())
                .map(extract_label)
                .unwrap_or_default()
        }
        Value::Array(items) => items.first().map(extract_label).unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Image service id and the resource that carries it
fn image_service(canvas: &Value) -> Option<(String, &Value)> {
    // Presentation API 2
    if let Some(resource) = canvas
        .get("images")
        .and_then(|images| images.get(0))
        .and_then(|image| image.get("resource"))
    {
        if let Some(id) = service_id(resource) {
            return Some((id, resource));
        }
    }

    // Presentation API 3
    canvas
        .get("items")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|page| page.get("items").and_then(Value::as_array))
        .flatten()
        .filter_map(|annotation| annotation.get("body"))
        .find_map(|body| service_id(body).map(|id| (id, body)))
}

fn service_id(resource: &Value) -> Option<String> {
    let service = match resource.get("service")? {
        Value::Array(services) => services.first()?,
        other => other,
    };
    service
        .get("@id")
        .or_else(|| service.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_presentation_2() {
        let manifest = json!({
            "label": "Bouppteckningar",
            "sequences": [{
                "canvases": [
                    {
                        "label": "Bild 1",
                        "width": 6192,
                        "height": 5432,
                        "images": [{"resource": {
                            "service": {"@id": "https://lbiiif.riksarkivet.se/arkis!A0068523_00001"}
                        }}]
                    },
                    {
                        "label": "no image",
                        "images": []
                    },
                    {
                        "images": [{"resource": {
                            "width": 100,
                            "height": 200,
                            "service": [{"@id": "https://lbiiif.riksarkivet.se/arkis!A0068523_00003"}]
                        }}]
                    }
                ]
            }]
        });

        let pages = parse_manifest_pages(&manifest);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].label, "Bild 1");
        assert_eq!(pages[0].image_id, "A0068523_00001");
        assert_eq!((pages[0].width, pages[0].height), (6192, 5432));
        assert_eq!(pages[1].page_number, 3);
        assert_eq!(pages[1].label, "Page 3");
        assert_eq!((pages[1].width, pages[1].height), (100, 200));
        assert_eq!(manifest_title(&manifest).as_deref(), Some("Bouppteckningar"));
    }

    #[test]
    fn test_parse_presentation_3() {
        let manifest = json!({
            "label": {"sv": ["Dombok"]},
            "items": [{
                "label": {"en": ["Page 1"]},
                "width": 1000,
                "height": 1500,
                "items": [{"items": [{"body": {
                    "service": [{"id": "https://example.org/iiif/img-1"}]
                }}]}]
            }]
        });

        let pages = parse_manifest_pages(&manifest);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].label, "Page 1");
        assert_eq!(pages[0].service_id, "https://example.org/iiif/img-1");
        assert_eq!(pages[0].image_id, "img-1");
        assert_eq!(manifest_title(&manifest).as_deref(), Some("Dombok"));
    }

    #[test]
    fn test_extract_label_shapes() {
        assert_eq!(extract_label(&json!("plain")), "plain");
        assert_eq!(extract_label(&json!(["first", "second"])), "first");
        assert_eq!(extract_label(&json!({"none": ["x"]})), "x");
        assert_eq!(extract_label(&json!([{"@value": "v"}])), "v");
        assert_eq!(extract_label(&json!(null)), "");
    }

    #[test]
    fn test_manifest_without_canvases() {
        assert!(parse_manifest_pages(&json!({"label": "x"})).is_empty());
    }
}
