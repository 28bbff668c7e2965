/// Pixel operation selected by the low bits of a graphics `type` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Clear,
    Set,
    Invert,
}

impl Mode {
    pub fn from_type(t: i32) -> Mode {
        match t & 0x03 {
            0 => Mode::Clear,
            2 => Mode::Invert,
            _ => Mode::Set,
        }
    }
}

/// ## One bit per pixel raster
///
/// A view over a framebuffer that lives in machine memory. Rows are
/// packed most significant bit first.
pub struct Raster<'a> {
    width: u16,
    height: u16,
    bits: &'a mut [u8],
}

impl<'a> Raster<'a> {
    pub fn new(width: u16, height: u16, bits: &'a mut [u8]) -> Raster<'a> {
        debug_assert!(bits.len() >= Raster::size(width, height));
        Raster {
            width,
            height,
            bits,
        }
    }

    pub fn size(width: u16, height: u16) -> usize {
        (usize::from(width) + 7) / 8 * usize::from(height)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<(usize, u8)> {
        if x < 0 || y < 0 || x >= i32::from(self.width) || y >= i32::from(self.height) {
            return None;
        }
        let stride = (usize::from(self.width) + 7) / 8;
        Some((y as usize * stride + x as usize / 8, 0x80 >> (x % 8)))
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some((i, bit)) => self.bits[i] & bit != 0,
            None => false,
        }
    }

    /// Off-raster coordinates are clipped.
    pub fn plot(&mut self, x: i32, y: i32, mode: Mode) {
        if let Some((i, bit)) = self.index(x, y) {
            match mode {
                Mode::Clear => self.bits[i] &= !bit,
                Mode::Set => self.bits[i] |= bit,
                Mode::Invert => self.bits[i] ^= bit,
            }
        }
    }

    /// Plots every distinct point once, so inverting shapes with shared
    /// corners leaves no holes.
    pub fn plot_all(&mut self, mut points: Vec<(i32, i32)>, mode: Mode) {
        points.sort_unstable();
        points.dedup();
        for (x, y) in points {
            self.plot(x, y, mode);
        }
    }

    pub fn clear(&mut self) {
        for byte in self.bits.iter_mut() {
            *byte = 0;
        }
    }

    pub fn to_ascii(&self) -> String {
        let mut s = String::new();
        for y in 0..i32::from(self.height) {
            for x in 0..i32::from(self.width) {
                s.push(if self.get(x, y) { '#' } else { '.' });
            }
            s.push('\n');
        }
        s
    }
}

fn line_points(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let mut points = vec![];
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    loop {
        points.push((x, y));
        if x == x1 && y == y1 {
            return points;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Liang-Barsky clip of a segment to `0..width` by `0..height`. Segments
/// already on the raster come back unchanged.
fn clip_line(from: (i32, i32), to: (i32, i32), width: u16, height: u16) -> Option<[i32; 4]> {
    let (x0, y0) = (f64::from(from.0), f64::from(from.1));
    let (dx, dy) = (f64::from(to.0) - x0, f64::from(to.1) - y0);
    let (right, bottom) = (f64::from(width) - 1.0, f64::from(height) - 1.0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x0), (dx, right - x0), (-dy, y0), (dy, bottom - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    let at = |t: f64| [(x0 + t * dx).round() as i32, (y0 + t * dy).round() as i32];
    let ([ax, ay], [bx, by]) = (at(t0), at(t1));
    Some([ax, ay, bx, by])
}

/// Half-width of an ellipse at row `dy` from its centre: the largest
/// `dx` with `dx²ry² + dy²rx² <= rx²ry²`.
fn ellipse_span(rx: i64, ry: i64, dy: i64) -> i64 {
    if ry == 0 {
        return rx;
    }
    let (rx, ry, dy) = (i128::from(rx), i128::from(ry), i128::from(dy));
    let limit = rx * rx * ry * ry - dy * dy * rx * rx;
    if limit < 0 {
        return 0;
    }
    let (mut lo, mut hi) = (0i128, rx);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if mid * mid * ry * ry <= limit {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo as i64
}

/// Off-raster coordinates stay off-raster.
fn coord(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// The part of `from..=to` inside `0..len`.
fn visible(from: i64, to: i64, len: u16) -> std::ops::RangeInclusive<i64> {
    from.max(0)..=to.min(i64::from(len) - 1)
}

/// ## Graphics collaborator
///
/// Drawing operations against a framebuffer in machine memory, plus
/// presenting a finished frame. The provided methods are a software
/// rasterizer; a host with its own renderer overrides them.
pub trait Graphics {
    fn present(&mut self, raster: &Raster);

    fn point(&mut self, raster: &mut Raster, x: i32, y: i32, mode: Mode) {
        raster.plot(x, y, mode);
    }

    fn line(&mut self, raster: &mut Raster, x0: i32, y0: i32, x1: i32, y1: i32, mode: Mode) {
        if let Some([x0, y0, x1, y1]) = clip_line((x0, y0), (x1, y1), raster.width(), raster.height()) {
            raster.plot_all(line_points(x0, y0, x1, y1), mode);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rect(
        &mut self,
        raster: &mut Raster,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        fill: bool,
        mode: Mode,
    ) {
        let (left, right) = (x0.min(x1), x0.max(x1));
        let (top, bottom) = (y0.min(y1), y0.max(y1));
        let mut points = vec![];
        let cols = visible(i64::from(left), i64::from(right), raster.width());
        for y in visible(i64::from(top), i64::from(bottom), raster.height()) {
            let y = y as i32;
            for x in cols.clone() {
                let x = x as i32;
                if fill || y == top || y == bottom || x == left || x == right {
                    points.push((x, y));
                }
            }
        }
        raster.plot_all(points, mode);
    }

    #[allow(clippy::too_many_arguments)]
    fn ellipse(
        &mut self,
        raster: &mut Raster,
        cx: i32,
        cy: i32,
        rx: i32,
        ry: i32,
        fill: bool,
        mode: Mode,
    ) {
        let (cx, cy) = (i64::from(cx), i64::from(cy));
        let (rx, ry) = (i64::from(rx).abs(), i64::from(ry).abs());
        let mut points = vec![];
        for y in visible(cy - ry, cy + ry, raster.height()) {
            let span = ellipse_span(rx, ry, y - cy);
            if fill {
                for x in visible(cx - span, cx + span, raster.width()) {
                    points.push((coord(x), coord(y)));
                }
            } else {
                points.push((coord(cx - span), coord(y)));
                points.push((coord(cx + span), coord(y)));
            }
        }
        if !fill {
            // Column extents close the gaps on steep parts of the arc.
            for x in visible(cx - rx, cx + rx, raster.width()) {
                let span = ellipse_span(ry, rx, x - cx);
                points.push((coord(x), coord(cy - span)));
                points.push((coord(x), coord(cy + span)));
            }
        }
        raster.plot_all(points, mode);
    }

    /// Flood fill of the 4-connected region sharing the seed's colour.
    fn fill(&mut self, raster: &mut Raster, x: i32, y: i32, mode: Mode) {
        if x < 0 || y < 0 || x >= i32::from(raster.width()) || y >= i32::from(raster.height()) {
            return;
        }
        let colour = raster.get(x, y);
        let width = usize::from(raster.width());
        let mut seen = vec![false; width * usize::from(raster.height())];
        let mut todo = vec![(x, y)];
        let mut region = vec![];
        while let Some((x, y)) = todo.pop() {
            if x < 0 || y < 0 || x >= i32::from(raster.width()) || y >= i32::from(raster.height()) {
                continue;
            }
            let i = y as usize * width + x as usize;
            if seen[i] || raster.get(x, y) != colour {
                continue;
            }
            seen[i] = true;
            region.push((x, y));
            todo.extend_from_slice(&[(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)]);
        }
        raster.plot_all(region, mode);
    }

    /// Draws a packed bitmap; set bits apply `mode`, clear bits are left alone.
    #[allow(clippy::too_many_arguments)]
    fn blit(
        &mut self,
        raster: &mut Raster,
        x: i32,
        y: i32,
        width: u16,
        height: u16,
        data: &[u8],
        mode: Mode,
    ) {
        let stride = (usize::from(width) + 7) / 8;
        let (x, y) = (i64::from(x), i64::from(y));
        let rows = visible(y, y + i64::from(height) - 1, raster.height());
        let cols = visible(x, x + i64::from(width) - 1, raster.width());
        for py in rows {
            let row = (py - y) as usize;
            for px in cols.clone() {
                let col = (px - x) as usize;
                let byte = data.get(row * stride + col / 8).copied().unwrap_or(0);
                if byte & (0x80 >> (col % 8)) != 0 {
                    raster.plot(px as i32, py as i32, mode);
                }
            }
        }
    }
}

/// Reference graphics host: keeps the last presented frame.
#[derive(Debug, Default)]
pub struct Pixels {
    frames: usize,
    width: u16,
    height: u16,
    screen: Vec<u8>,
}

impl Pixels {
    pub fn new() -> Pixels {
        Pixels::default()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn screen(&self) -> &[u8] {
        &self.screen
    }

    pub fn to_ascii(&mut self) -> String {
        let (width, height) = (self.width, self.height);
        Raster::new(width, height, &mut self.screen).to_ascii()
    }
}

impl Graphics for Pixels {
    fn present(&mut self, raster: &Raster) {
        self.frames += 1;
        self.width = raster.width;
        self.height = raster.height;
        self.screen = raster.bits[..Raster::size(raster.width, raster.height)].to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> Vec<u8> {
        vec![0u8; Raster::size(16, 8)]
    }

    #[test]
    fn test_plot_clips() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        raster.plot(-1, 0, Mode::Set);
        raster.plot(16, 0, Mode::Set);
        raster.plot(0, 0, Mode::Set);
        raster.plot(9, 1, Mode::Set);
        assert_eq!(bits[0], 0x80);
        assert_eq!(bits[3], 0x40);
    }

    #[test]
    fn test_line_endpoints() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        Pixels::new().line(&mut raster, 0, 0, 7, 7, Mode::Set);
        assert!(raster.get(0, 0));
        assert!(raster.get(3, 3));
        assert!(raster.get(7, 7));
        assert!(!raster.get(7, 0));
    }

    #[test]
    fn test_inverted_box_outline_has_corners() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        Pixels::new().rect(&mut raster, 1, 1, 4, 4, false, Mode::Invert);
        assert!(raster.get(1, 1));
        assert!(raster.get(4, 4));
        assert!(!raster.get(2, 2));
    }

    #[test]
    fn test_fill_stops_at_border() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        let mut gfx = Pixels::new();
        gfx.rect(&mut raster, 0, 0, 5, 5, false, Mode::Set);
        gfx.fill(&mut raster, 2, 2, Mode::Set);
        assert!(raster.get(3, 3));
        assert!(!raster.get(7, 7));
    }

    #[test]
    fn test_filled_circle_is_symmetric() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        Pixels::new().ellipse(&mut raster, 7, 3, 3, 3, true, Mode::Set);
        assert!(raster.get(4, 3));
        assert!(raster.get(10, 3));
        assert!(raster.get(7, 0));
        assert!(raster.get(7, 6));
        assert!(!raster.get(4, 0));
    }

    #[test]
    fn test_huge_shapes_are_clipped() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        let mut gfx = Pixels::new();
        gfx.rect(&mut raster, -32768, -32768, 32767, 32767, false, Mode::Set);
        assert!(!raster.get(0, 0));
        gfx.rect(&mut raster, -32768, -32768, 32767, 32767, true, Mode::Set);
        assert!(raster.get(0, 0) && raster.get(15, 7));
        gfx.ellipse(&mut raster, 8, 4, i32::MAX, i32::MIN, true, Mode::Invert);
        assert!(!raster.get(0, 0) && !raster.get(15, 7));
        gfx.line(&mut raster, i32::MIN, 3, i32::MAX, 3, Mode::Set);
        assert!(raster.get(0, 3) && raster.get(15, 3) && !raster.get(0, 2));
        gfx.blit(&mut raster, -5, -5, u16::MAX, u16::MAX, &vec![0xFF; 0x1_2000], Mode::Clear);
        assert!(!raster.get(0, 3));
    }

    #[test]
    fn test_clipped_line_keeps_slope() {
        let mut bits = canvas();
        let mut raster = Raster::new(16, 8, &mut bits);
        Pixels::new().line(&mut raster, -8, -8, 23, 23, Mode::Set);
        assert!(raster.get(0, 0));
        assert!(raster.get(5, 5));
        assert!(raster.get(7, 7));
        assert!(!raster.get(8, 7));
    }

    #[test]
    fn test_present_keeps_frame() {
        let mut bits = canvas();
        bits[0] = 0xC0;
        let raster = Raster::new(16, 8, &mut bits);
        let mut pixels = Pixels::new();
        pixels.present(&raster);
        assert_eq!(pixels.frames(), 1);
        assert!(pixels.to_ascii().starts_with("##.............."));
    }
}
