use crate::types::{Pose, PoseModel};

/// MoveNet bones, including the face edges.
pub const MOVENET_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (5, 11),
    (6, 8),
    (6, 12),
    (7, 9),
    (8, 10),
    (11, 12),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// PoseNet bones: torso and limbs only.
pub const POSENET_CONNECTIONS: &[(usize, usize)] = &[
    (11, 5),
    (7, 5),
    (7, 9),
    (11, 13),
    (13, 15),
    (12, 6),
    (8, 6),
    (8, 10),
    (12, 14),
    (14, 16),
    (5, 6),
    (11, 12),
];

pub fn connections_for(model: PoseModel) -> &'static [(usize, usize)] {
    match model {
        PoseModel::MoveNet => MOVENET_CONNECTIONS,
        PoseModel::PoseNet => POSENET_CONNECTIONS,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub color: [u8; 4],
    pub confidence_threshold: f32,
    pub dot_radius: f32,
    pub line_width: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub markers: usize,
    pub segments: usize,
}

/// Drawing target for the skeleton renderer. Coordinates are canvas pixels.
pub trait DrawSurface {
    fn clear(&mut self);
    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: [u8; 4]);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: [u8; 4]);
}

/// Draws confidence-filtered markers and bones. Does not clear the surface.
pub fn draw<S: DrawSurface + ?Sized>(
    poses: &[Pose],
    surface: &mut S,
    style: &OverlayStyle,
    connections: &[(usize, usize)],
    visual_scale: f32,
) -> DrawStats {
    let mut stats = DrawStats::default();
    let threshold = style.confidence_threshold;
    let radius = style.dot_radius * visual_scale;
    let width = style.line_width * visual_scale;

    for pose in poses {
        for &(a, b) in connections {
            // Out-of-range indices skip the bone.
            let (Some(pa), Some(pb)) = (pose.get(a), pose.get(b)) else {
                continue;
            };
            if pa.exceeds(threshold) && pb.exceeds(threshold) {
                surface.stroke_line((pa.x, pa.y), (pb.x, pb.y), width, style.color);
                stats.segments += 1;
            }
        }

        for kp in pose.keypoints.iter().filter(|kp| kp.exceeds(threshold)) {
            surface.fill_circle((kp.x, kp.y), radius, style.color);
            stats.markers += 1;
        }
    }

    stats
}

/// RGBA overlay owned by one model. Transparent pixels are left alone by the
/// compositor.
#[derive(Clone, Debug)]
pub struct OverlayLayer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl OverlayLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Resizing discards the current content.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.rgba = vec![0; (width as usize) * (height as usize) * 4];
    }

    pub fn is_blank(&self) -> bool {
        self.rgba.iter().all(|&b| b == 0)
    }

    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        let px = self.rgba.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    fn put_pixel_safe(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy as usize) * (self.width as usize) + ux as usize) * 4;
        if idx + 3 < self.rgba.len() {
            self.rgba[idx..idx + 4].copy_from_slice(&color);
        }
    }

    /// Only the part of the disc that overlaps the layer is visited, so the
    /// cost is bounded by the layer area whatever the radius.
    fn stamp_disc(&mut self, cx: i32, cy: i32, radius: i32, color: [u8; 4]) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let (cx, cy, radius) = (cx as i64, cy as i64, (radius as i64).max(0));
        let (x_lo, x_hi) = ((cx - radius).max(0), (cx + radius).min(w - 1));
        let (y_lo, y_hi) = ((cy - radius).max(0), (cy + radius).min(h - 1));
        // Offsets from a saturated centre can exceed i64 once squared.
        let r2 = (radius as i128).pow(2);

        for y in y_lo..=y_hi {
            let dy2 = ((y - cy) as i128).pow(2);
            for x in x_lo..=x_hi {
                if ((x - cx) as i128).pow(2) + dy2 <= r2 {
                    self.put_pixel_safe(x as i32, y as i32, color);
                }
            }
        }
    }
}

impl DrawSurface for OverlayLayer {
    fn clear(&mut self) {
        self.rgba.fill(0);
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: [u8; 4]) {
        let radius = radius.round().max(1.0) as i32;
        self.stamp_disc(center.0.round() as i32, center.1.round() as i32, radius, color);
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: [u8; 4]) {
        let (mut x0, mut y0) = (from.0.round() as i32, from.1.round() as i32);
        let (x1, y1) = (to.0.round() as i32, to.1.round() as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = ((width.round() as i32).max(1) - 1) / 2;

        loop {
            if radius > 0 {
                self.stamp_disc(x0, y0, radius, color);
            } else {
                self.put_pixel_safe(x0, y0, color);
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{pipeline::mapper::CanvasScale, types::Keypoint};

    /// Records draw calls instead of rasterizing them.
    #[derive(Default)]
    pub(crate) struct RecordingSurface {
        pub circles: Vec<((f32, f32), f32)>,
        pub lines: Vec<((f32, f32), (f32, f32), f32)>,
        pub clears: usize,
    }

    impl DrawSurface for RecordingSurface {
        fn clear(&mut self) {
            self.clears += 1;
            self.circles.clear();
            self.lines.clear();
        }

        fn fill_circle(&mut self, center: (f32, f32), radius: f32, _color: [u8; 4]) {
            self.circles.push((center, radius));
        }

        fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, _color: [u8; 4]) {
            self.lines.push((from, to, width));
        }
    }

    fn style(threshold: f32) -> OverlayStyle {
        OverlayStyle {
            color: [255, 0, 0, 255],
            confidence_threshold: threshold,
            dot_radius: 4.0,
            line_width: 2.0,
        }
    }

    fn two_point_pose() -> Pose {
        Pose::new(vec![
            Keypoint::new(100.0, 100.0, 0.9),
            Keypoint::new(200.0, 100.0, 0.9),
        ])
    }

    fn draw_scaled(threshold: f32) -> (RecordingSurface, DrawStats) {
        let scale = CanvasScale::between(640.0, 480.0, 1280.0, 960.0).unwrap();
        let poses = crate::pipeline::mapper::map_poses(&[two_point_pose()], scale);
        let mut surface = RecordingSurface::default();
        let stats = draw(&poses, &mut surface, &style(threshold), &[(0, 1)], scale.visual());
        (surface, stats)
    }

    #[test]
    fn scaled_pose_lands_on_expected_canvas_points() {
        let (surface, stats) = draw_scaled(0.5);
        assert_eq!(stats, DrawStats { markers: 2, segments: 1 });
        let centers: Vec<_> = surface.circles.iter().map(|(c, _)| *c).collect();
        assert_eq!(centers, vec![(200.0, 200.0), (400.0, 200.0)]);
        assert_eq!(surface.lines, vec![((200.0, 200.0), (400.0, 200.0), 4.0)]);
        assert!(surface.circles.iter().all(|(_, r)| *r == 8.0));
    }

    #[test]
    fn high_threshold_draws_nothing() {
        let (surface, stats) = draw_scaled(0.95);
        assert_eq!(stats, DrawStats::default());
        assert!(surface.circles.is_empty());
        assert!(surface.lines.is_empty());
    }

    #[test]
    fn all_low_scores_draw_nothing() {
        let pose = Pose::new(
            (0..17)
                .map(|i| Keypoint::new(i as f32 * 10.0, 5.0, 0.1))
                .collect(),
        );
        let mut surface = RecordingSurface::default();
        let stats = draw(&[pose], &mut surface, &style(0.3), MOVENET_CONNECTIONS, 1.0);
        assert_eq!(stats, DrawStats::default());
    }

    #[test]
    fn bone_needs_both_endpoints() {
        let pose = Pose::new(vec![
            Keypoint::new(0.0, 0.0, 0.9),
            Keypoint::new(10.0, 0.0, 0.2),
            Keypoint::new(20.0, 0.0, 0.9),
        ]);
        let mut surface = RecordingSurface::default();
        let stats = draw(&[pose], &mut surface, &style(0.5), &[(0, 1), (1, 2), (0, 2)], 1.0);
        assert_eq!(stats.segments, 1);
        assert_eq!(stats.markers, 2);
        assert_eq!(surface.lines[0].0, (0.0, 0.0));
        assert_eq!(surface.lines[0].1, (20.0, 0.0));
    }

    #[test]
    fn out_of_range_bone_is_skipped() {
        let mut surface = RecordingSurface::default();
        let stats = draw(&[two_point_pose()], &mut surface, &style(0.5), &[(0, 1), (1, 40)], 1.0);
        assert_eq!(stats.segments, 1);
    }

    #[test]
    fn adjacency_tables_reference_coco_indices() {
        for model in PoseModel::ALL {
            for &(a, b) in connections_for(model) {
                assert!(a < 17 && b < 17, "{model}: ({a}, {b})");
            }
        }
        assert_eq!(MOVENET_CONNECTIONS.len(), 16);
        assert_eq!(POSENET_CONNECTIONS.len(), 12);
    }

    #[test]
    fn layer_rasterizes_and_clears() {
        let mut layer = OverlayLayer::new(64, 48);
        assert!(layer.is_blank());
        let stats = draw(&[two_point_pose_small()], &mut layer, &style(0.5), &[(0, 1)], 1.0);
        assert_eq!(stats.segments, 1);
        assert_eq!(layer.pixel(10, 10), Some([255, 0, 0, 255]));
        assert_eq!(layer.pixel(25, 10), Some([255, 0, 0, 255]));
        assert_eq!(layer.pixel(25, 40), Some([0, 0, 0, 0]));
        layer.clear();
        assert!(layer.is_blank());
    }

    #[test]
    fn drawing_off_canvas_is_clipped() {
        let mut layer = OverlayLayer::new(8, 8);
        layer.fill_circle((-20.0, -20.0), 3.0, [1, 2, 3, 4]);
        layer.stroke_line((-5.0, 4.0), (50.0, 4.0), 1.0, [9, 9, 9, 9]);
        assert_eq!(layer.pixel(0, 4), Some([9, 9, 9, 9]));
        assert_eq!(layer.pixel(7, 4), Some([9, 9, 9, 9]));
        assert_eq!(layer.pixel(8, 4), None);
    }

    #[test]
    fn resize_discards_content() {
        let mut layer = OverlayLayer::new(4, 4);
        layer.fill_circle((2.0, 2.0), 1.0, [1, 1, 1, 1]);
        layer.resize(6, 3);
        assert_eq!((layer.width(), layer.height()), (6, 3));
        assert_eq!(layer.rgba().len(), 6 * 3 * 4);
        assert!(layer.is_blank());
    }

    #[test]
    fn huge_radius_is_clipped_to_the_layer() {
        let mut layer = OverlayLayer::new(64, 48);
        let big = OverlayStyle {
            dot_radius: 50_000.0,
            line_width: 50_000.0,
            ..style(0.5)
        };
        let stats = draw(&[two_point_pose_small()], &mut layer, &big, &[(0, 1)], 1.0);
        assert_eq!(stats, DrawStats { markers: 2, segments: 1 });
        assert_eq!(layer.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(layer.pixel(63, 47), Some([255, 0, 0, 255]));

        // Centre far off the layer with a radius that cannot reach it.
        let mut layer = OverlayLayer::new(8, 8);
        layer.fill_circle((1.0e9, 1.0e9), 3.0, [1, 1, 1, 1]);
        assert!(layer.is_blank());

        // A saturated radius still reaches the layer without overflow.
        layer.fill_circle((-1.0e9, 4.0), 1.0e12, [1, 1, 1, 1]);
        assert_eq!(layer.pixel(0, 4), Some([1, 1, 1, 1]));
    }

    fn two_point_pose_small() -> Pose {
        Pose::new(vec![
            Keypoint::new(10.0, 10.0, 0.9),
            Keypoint::new(40.0, 10.0, 0.9),
        ])
    }
}
