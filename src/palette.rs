/// RGB triple
pub type Rgb = (u8, u8, u8);

/// ColorBrewer YlGnBu, 9 classes, light to dark
const YLGNBU: [Rgb; 9] = [
    (0xff, 0xff, 0xd9),
    (0xed, 0xf8, 0xb1),
    (0xc7, 0xe9, 0xb4),
    (0x7f, 0xcd, 0xbb),
    (0x41, 0xb6, 0xc4),
    (0x1d, 0x91, 0xc0),
    (0x22, 0x5e, 0xa8),
    (0x25, 0x34, 0x94),
    (0x08, 0x1d, 0x58),
];

/// Fill opacity of the choropleth
pub const FILL_OPACITY: f64 = 0.5;

/// `n` colors spread evenly across the palette
pub fn sequential(n: usize) -> Vec<Rgb> {
    match n {
        0 => Vec::new(),
        1 => vec![YLGNBU[YLGNBU.len() / 2]],
        _ => (0..n)
            .map(|i| {
                let idx = (i as f64 * (YLGNBU.len() - 1) as f64 / (n - 1) as f64).round() as usize;
                YLGNBU[idx.min(YLGNBU.len() - 1)]
            })
            .collect(),
    }
}

/// Alpha-blend `fg` over `bg`
pub fn blend(fg: Rgb, bg: Rgb, alpha: f64) -> Rgb {
    let mix = |f: u8, b: u8| (f as f64 * alpha + b as f64 * (1.0 - alpha)).round() as u8;
    (mix(fg.0, bg.0), mix(fg.1, bg.1), mix(fg.2, bg.2))
}

pub fn to_hex(c: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", c.0, c.1, c.2)
}
