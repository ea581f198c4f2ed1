use std::path::{Path, PathBuf};
use std::sync::Arc;

use slidecast::text::{TextLayoutEngine, wrap_to_width};
use slidecast::{Canvas, FrameRenderer, PageImage, RenderTheme, Slide};

/// First TTF/OTF under the common system font directories, if any. Layout
/// tests skip when the machine has no fonts at all.
fn find_system_font() -> Option<PathBuf> {
    let mut roots: Vec<PathBuf> = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("/Library/Fonts"),
        PathBuf::from("C:\\Windows\\Fonts"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        roots.push(Path::new(&home).join(".local/share/fonts"));
        roots.push(Path::new(&home).join(".fonts"));
    }
    roots.into_iter().find_map(|root| find_font_under(&root))
}

fn find_font_under(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_dir() {
            if let Some(found) = find_font_under(path) {
                return Some(found);
            }
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("ttf") | Some("otf")
        ) {
            return Some(path.clone());
        }
    }
    None
}

fn font_bytes() -> Option<Arc<Vec<u8>>> {
    let path = find_system_font()?;
    std::fs::read(path).ok().map(Arc::new)
}

fn red_page(width: u32, height: u32) -> PageImage {
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        rgba.extend_from_slice(&[255, 0, 0, 255]);
    }
    PageImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba),
    }
}

fn pixel(frame: &slidecast::FrameRGBA, x: u32, y: u32) -> [u8; 4] {
    let idx = ((y * frame.width + x) * 4) as usize;
    [
        frame.data[idx],
        frame.data[idx + 1],
        frame.data[idx + 2],
        frame.data[idx + 3],
    ]
}

#[test]
fn passthrough_is_deterministic_and_letterboxed() {
    // Passthrough never touches fonts, so an empty font blob is fine.
    let mut renderer = FrameRenderer::new(RenderTheme::new(Arc::new(Vec::new())));
    let canvas = Canvas {
        width: 64,
        height: 64,
    };

    let mut slide = Slide::new(0, "Ignored", "ignored");
    slide.source_image = Some(red_page(4, 2));

    let a = renderer.render(&slide, canvas).unwrap();
    let b = renderer.render(&slide, canvas).unwrap();
    assert_eq!(a.data, b.data, "passthrough rendering must be deterministic");
    assert_eq!(a.width, 64);
    assert_eq!(a.height, 64);

    // 4x2 into 64x64 letterboxes to rows 16..48; bars above and below keep
    // the background color.
    let bg = pixel(&a, 2, 2);
    assert_eq!(bg, pixel(&a, 61, 61));
    assert_eq!(bg[3], 255);
    assert!(bg[0] < 60, "top bar must stay background, got {bg:?}");

    let center = pixel(&a, 32, 32);
    assert!(
        center[0] > 200 && center[1] < 50 && center[2] < 50,
        "image center must be red, got {center:?}"
    );
}

#[test]
fn layout_path_is_deterministic() {
    let Some(font) = font_bytes() else {
        eprintln!("no system font found; skipping layout determinism test");
        return;
    };

    let mut renderer = FrameRenderer::new(RenderTheme::new(font));
    let canvas = Canvas {
        width: 640,
        height: 360,
    };

    let mut slide = Slide::new(
        2,
        "A title long enough to wrap onto a second line of the frame",
        "Narration text that the renderer wraps greedily across several lines \
         of the synthesized layout, with room to spare.",
    );
    slide.source_image = None;

    let a = renderer.render(&slide, canvas).unwrap();
    let b = renderer.render(&slide, canvas).unwrap();
    assert_eq!(a.data, b.data, "layout rendering must be deterministic");

    // Bulleted variant as well.
    slide.content = vec!["first point".to_string(), "second point".to_string()];
    let c = renderer.render(&slide, canvas).unwrap();
    let d = renderer.render(&slide, canvas).unwrap();
    assert_eq!(c.data, d.data);
    assert_ne!(a.data, c.data, "bullets must change the frame");
}

#[test]
fn layout_differs_between_slides() {
    let Some(font) = font_bytes() else {
        eprintln!("no system font found; skipping layout difference test");
        return;
    };

    let mut renderer = FrameRenderer::new(RenderTheme::new(font));
    let canvas = Canvas {
        width: 640,
        height: 360,
    };

    let one = renderer
        .render(&Slide::new(0, "First", "Some narration."), canvas)
        .unwrap();
    let two = renderer
        .render(&Slide::new(1, "Second", "Other narration."), canvas)
        .unwrap();
    assert_ne!(one.data, two.data);
}

#[test]
fn glyph_measured_wrapping_never_overflows() {
    let Some(font) = font_bytes() else {
        eprintln!("no system font found; skipping glyph wrap test");
        return;
    };

    let mut engine = TextLayoutEngine::new(font);
    let size = 30.0f32;
    let max_width = 180.0f32;

    let text = "an unbroken supercalifragilisticexpialidocious word and then prose";
    let lines = wrap_to_width(text, max_width, 50, &mut |s| engine.measure(s, size)).unwrap();

    assert!(lines.len() > 1);
    for line in &lines {
        let w = engine.measure(line, size).unwrap();
        assert!(
            w <= max_width + 0.5,
            "line {line:?} measures {w}, exceeding {max_width}"
        );
    }
}
