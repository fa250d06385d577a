//! Stylesheet and font files embedded into the binary at build time and
//! registered with the book builder during assembly.

/// One embedded file destined for the book container.
pub struct Asset {
    pub name: &'static str,
    pub data: &'static [u8],
    pub mime: &'static str,
}

/// Stylesheets added under `styles/` in the container.
pub static STYLES: &[Asset] = &[Asset {
    name: "main.css",
    data: include_bytes!("../../assets/styles/main.css"),
    mime: "text/css",
}];

/// Fonts added under `fonts/` in the container. Font binaries are not kept
/// in-tree; entries added here are picked up by the assembler unchanged.
pub static FONTS: &[Asset] = &[];

/// Body of the synthetic book-wide stylesheet: one `@import` per embedded
/// stylesheet, so every section pulls in the whole bundle.
pub fn stylesheet_imports() -> String {
    let mut css = String::new();
    for asset in STYLES {
        css.push_str("@import url('styles/");
        css.push_str(asset.name);
        css.push_str("');\n");
    }
    css
}
