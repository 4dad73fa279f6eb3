use image::{GrayImage, ImageBuffer, Luma};

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into a `grid` x `grid` arrangement of tiles. Each tile
/// gets its own equalisation table built from a histogram whose bins are
/// clipped at `clip_limit * tile_pixels / 256`; the clipped excess is spread
/// evenly over all bins. Output pixels interpolate bilinearly between the
/// tables of the four nearest tile centres.
pub fn equalize_adaptive(image: &GrayImage, clip_limit: f64, grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || grid == 0 {
        return image.clone();
    }

    let tile_w = width.div_ceil(grid.min(width));
    let tile_h = height.div_ceil(grid.min(height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut tables = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            tables.push(tile_table(image, x0, y0, x1, y1, clip_limit));
        }
    }

    let table = |tx: u32, ty: u32| &tables[(ty * tiles_x + tx) as usize];

    ImageBuffer::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0] as usize;

        let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);

        let top = f32::from(table(tx0, ty0)[value]) * (1.0 - ax)
            + f32::from(table(tx1, ty0)[value]) * ax;
        let bottom = f32::from(table(tx0, ty1)[value]) * (1.0 - ax)
            + f32::from(table(tx1, ty1)[value]) * ax;
        let out = top * (1.0 - ay) + bottom * ay;
        Luma([out.round().clamp(0.0, 255.0) as u8])
    })
}

/// Indices of the two tiles whose centres bracket `pos`, and the blend factor.
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let lo = (f.floor() as u32).min(tiles - 1);
    let hi = (lo + 1).min(tiles - 1);
    let a = if hi == lo { 0.0 } else { f - lo as f32 };
    (lo, hi, a)
}

fn tile_table(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f64) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let pixels = (x1 - x0) * (y1 - y0);

    let limit = ((clip_limit * f64::from(pixels) / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share;
        if i < remainder {
            *bin += 1;
        }
    }

    let mut table = [0u8; 256];
    let scale = 255.0 / pixels.max(1) as f32;
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        table[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    table
}
