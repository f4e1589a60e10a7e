//! ABOUTME: Canny edge detector over 8-bit grayscale images
//! ABOUTME: Sobel gradients, L1 magnitude, non-maximum suppression, and hysteresis

use image::GrayImage;

const EDGE: u8 = 255;

// tan(22.5°) and tan(67.5°) split the gradient angle into four sectors
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Class {
    Suppressed,
    Weak,
    Strong,
}

/// Detect edges, returning a 0/255 mask of the same size
///
/// Pixels whose gradient magnitude exceeds `high` seed edges; pixels above
/// `low` are kept only when 8-connected to a seed. Thresholds are swapped if
/// given in the wrong order.
pub fn canny(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let w = width as usize;
    let h = height as usize;

    let mut out = GrayImage::new(width, height);
    if w == 0 || h == 0 {
        return out;
    }

    let (gx, gy) = sobel(image.as_raw(), w, h);
    let magnitude: Vec<f32> = gx
        .iter()
        .zip(gy.iter())
        .map(|(x, y)| (x.abs() + y.abs()) as f32)
        .collect();

    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut classes = vec![Class::Suppressed; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let ax = gx[idx].abs() as f32;
            let ay = gy[idx].abs() as f32;
            let (xi, yi) = (x as isize, y as isize);

            let (prev, next) = if ay < ax * TAN_22_5 {
                (mag_at(xi - 1, yi), mag_at(xi + 1, yi))
            } else if ay > ax * TAN_67_5 {
                (mag_at(xi, yi - 1), mag_at(xi, yi + 1))
            } else if (gx[idx] < 0) == (gy[idx] < 0) {
                (mag_at(xi - 1, yi - 1), mag_at(xi + 1, yi + 1))
            } else {
                (mag_at(xi + 1, yi - 1), mag_at(xi - 1, yi + 1))
            };

            // Strict on one side so plateaus yield a single-pixel ridge
            if m > prev && m >= next {
                if m > high {
                    classes[idx] = Class::Strong;
                    stack.push(idx);
                } else {
                    classes[idx] = Class::Weak;
                }
            }
        }
    }

    let buf: &mut [u8] = &mut out;
    for &idx in &stack {
        buf[idx] = EDGE;
    }

    while let Some(idx) = stack.pop() {
        let x = (idx % w) as isize;
        let y = (idx / w) as isize;
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if classes[n] == Class::Weak {
                    classes[n] = Class::Strong;
                    buf[n] = EDGE;
                    stack.push(n);
                }
            }
        }
    }

    out
}

/// 3x3 Sobel derivatives with replicated borders
fn sobel(pixels: &[u8], w: usize, h: usize) -> (Vec<i32>, Vec<i32>) {
    let at = |x: isize, y: isize| -> i32 {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        pixels[y * w + x] as i32
    };

    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];

    for y in 0..h as isize {
        for x in 0..w as isize {
            let tl = at(x - 1, y - 1);
            let tc = at(x, y - 1);
            let tr = at(x + 1, y - 1);
            let ml = at(x - 1, y);
            let mr = at(x + 1, y);
            let bl = at(x - 1, y + 1);
            let bc = at(x, y + 1);
            let br = at(x + 1, y + 1);

            let idx = y as usize * w + x as usize;
            gx[idx] = (tr + 2 * mr + br) - (tl + 2 * ml + bl);
            gy[idx] = (bl + 2 * bc + br) - (tl + 2 * tc + tr);
        }
    }

    (gx, gy)
}
