//! Rasterizer interface and a small tiny-skia scene
//!
//! The frame pipeline only needs something that can paint a whole logical
//! image: [`Painter`]. Toolkits plug their scene walker in there. [`Scene`]
//! is a minimal walker over a closed set of [`Drawable`] kinds, enough for the
//! demo binary and the tests.

use std::sync::Arc;

use tiny_skia::{
    Color, FillRule, GradientStop, LinearGradient, Mask, Paint, PathBuilder, Pixmap, PixmapMut,
    PixmapPaint, PixmapRef, Point, Rect, Shader, SpreadMode, Stroke, Transform,
};

/// Paints the complete logical image of a window.
///
/// `scale` maps toolkit coordinates to the image's device pixels.
pub trait Painter: Send + Sync {
    fn paint(&self, target: &mut PixmapMut<'_>, scale: f32);
}

impl<F> Painter for F
where
    F: Fn(&mut PixmapMut<'_>, f32) + Send + Sync,
{
    fn paint(&self, target: &mut PixmapMut<'_>, scale: f32) {
        self(target, scale)
    }
}

/// Something a [`Scene`] knows how to draw, in toolkit coordinates.
pub trait Drawable: Send + Sync {
    fn draw(&self, target: &mut PixmapMut<'_>, clip: Option<&Mask>, transform: Transform);
}

fn solid(color: Color) -> Paint<'static> {
    Paint {
        shader: Shader::SolidColor(color),
        anti_alias: true,
        ..Default::default()
    }
}

/// Filled axis-aligned rectangle.
#[derive(Debug, Clone, Copy)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: Color,
}

impl Drawable for Rectangle {
    fn draw(&self, target: &mut PixmapMut<'_>, clip: Option<&Mask>, transform: Transform) {
        if let Some(rect) = Rect::from_xywh(self.x, self.y, self.width, self.height) {
            target.fill_rect(rect, &solid(self.fill), transform, clip);
        }
    }
}

/// Filled circle.
#[derive(Debug, Clone, Copy)]
pub struct Circle {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub fill: Color,
}

impl Drawable for Circle {
    fn draw(&self, target: &mut PixmapMut<'_>, clip: Option<&Mask>, transform: Transform) {
        if let Some(path) = PathBuilder::from_circle(self.cx, self.cy, self.radius) {
            target.fill_path(&path, &solid(self.fill), FillRule::Winding, transform, clip);
        }
    }
}

/// Stroked line segment.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub from: Point,
    pub to: Point,
    pub width: f32,
    pub color: Color,
}

impl Drawable for Line {
    fn draw(&self, target: &mut PixmapMut<'_>, clip: Option<&Mask>, transform: Transform) {
        let mut pb = PathBuilder::new();
        pb.move_to(self.from.x, self.from.y);
        pb.line_to(self.to.x, self.to.y);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: self.width,
            ..Default::default()
        };
        target.stroke_path(&path, &solid(self.color), &stroke, transform, clip);
    }
}

/// Rectangle filled with a two-stop linear gradient from left to right.
#[derive(Debug, Clone, Copy)]
pub struct Gradient {
    pub bounds: Rect,
    pub start: Color,
    pub end: Color,
}

impl Drawable for Gradient {
    fn draw(&self, target: &mut PixmapMut<'_>, clip: Option<&Mask>, transform: Transform) {
        let shader = LinearGradient::new(
            Point::from_xy(self.bounds.left(), self.bounds.top()),
            Point::from_xy(self.bounds.right(), self.bounds.top()),
            vec![
                GradientStop::new(0.0, self.start),
                GradientStop::new(1.0, self.end),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        );
        let Some(shader) = shader else {
            return;
        };
        let paint = Paint {
            shader,
            anti_alias: true,
            ..Default::default()
        };
        target.fill_rect(self.bounds, &paint, transform, clip);
    }
}

/// A pre-rendered RGBA image placed at a toolkit position.
#[derive(Clone)]
pub struct Image {
    pub x: i32,
    pub y: i32,
    pub pixels: Arc<Pixmap>,
}

impl Drawable for Image {
    fn draw(&self, target: &mut PixmapMut<'_>, clip: Option<&Mask>, transform: Transform) {
        let source: PixmapRef<'_> = Pixmap::as_ref(&self.pixels);
        target.draw_pixmap(
            self.x,
            self.y,
            source,
            &PixmapPaint::default(),
            transform,
            clip,
        );
    }
}

/// Pixels computed per device pixel by a generator function.
pub struct Raster {
    pub generator: Box<dyn Fn(u32, u32, u32, u32) -> [u8; 4] + Send + Sync>,
}

impl Drawable for Raster {
    fn draw(&self, target: &mut PixmapMut<'_>, _clip: Option<&Mask>, _transform: Transform) {
        let (width, height) = (target.width(), target.height());
        for (i, pixel) in target.data_mut().chunks_exact_mut(4).enumerate() {
            let x = i as u32 % width;
            let y = i as u32 / width;
            pixel.copy_from_slice(&(self.generator)(x, y, width, height));
        }
    }
}

/// A background colour plus drawables painted back to front.
#[derive(Default)]
pub struct Scene {
    pub background: Option<Color>,
    pub clip: Option<Rect>,
    pub objects: Vec<Box<dyn Drawable>>,
}

impl Scene {
    pub fn new(background: Color) -> Self {
        Self {
            background: Some(background),
            ..Default::default()
        }
    }

    pub fn with(mut self, object: impl Drawable + 'static) -> Self {
        self.objects.push(Box::new(object));
        self
    }
}

impl Painter for Scene {
    fn paint(&self, target: &mut PixmapMut<'_>, scale: f32) {
        target.fill(self.background.unwrap_or(Color::TRANSPARENT));

        let transform = Transform::from_scale(scale, scale);
        let mask = self.clip.and_then(|rect| {
            let mut mask = Mask::new(target.width(), target.height())?;
            mask.fill_path(
                &PathBuilder::from_rect(rect),
                FillRule::Winding,
                false,
                transform,
            );
            Some(mask)
        });

        for object in &self.objects {
            object.draw(target, mask.as_ref(), transform);
        }
    }
}

/// Paints nothing but transparency.
pub struct Blank;

impl Painter for Blank {
    fn paint(&self, target: &mut PixmapMut<'_>, _scale: f32) {
        target.fill(Color::TRANSPARENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * pixmap.width() + x) * 4) as usize;
        pixmap.data()[i..i + 4].try_into().unwrap()
    }

    #[test]
    fn test_scene_background_and_rectangle() {
        let scene = Scene::new(Color::from_rgba8(0, 0, 255, 255)).with(Rectangle {
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 5.0,
            fill: Color::from_rgba8(255, 0, 0, 255),
        });

        let mut pixmap = Pixmap::new(10, 10).unwrap();
        scene.paint(&mut pixmap.as_mut(), 1.0);

        assert_eq!(pixel(&pixmap, 2, 2), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixmap, 8, 8), [0, 0, 255, 255]);
    }

    #[test]
    fn test_scene_scales_to_device_pixels() {
        let scene = Scene::new(Color::BLACK).with(Rectangle {
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 5.0,
            fill: Color::WHITE,
        });

        let mut pixmap = Pixmap::new(10, 10).unwrap();
        scene.paint(&mut pixmap.as_mut(), 2.0);
        assert_eq!(pixel(&pixmap, 9, 9), [255, 255, 255, 255]);
    }

    #[test]
    fn test_clip_limits_drawing() {
        let mut scene = Scene::new(Color::BLACK).with(Rectangle {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            fill: Color::WHITE,
        });
        scene.clip = Rect::from_xywh(0.0, 0.0, 4.0, 4.0);

        let mut pixmap = Pixmap::new(10, 10).unwrap();
        scene.paint(&mut pixmap.as_mut(), 1.0);
        assert_eq!(pixel(&pixmap, 1, 1), [255, 255, 255, 255]);
        assert_eq!(pixel(&pixmap, 7, 7), [0, 0, 0, 255]);
    }

    fn fill_translucent(target: &mut PixmapMut<'_>, _scale: f32) {
        target.fill(Color::from_rgba8(10, 20, 30, 128));
    }

    #[test]
    fn test_function_painter() {
        let mut pixmap = Pixmap::new(2, 2).unwrap();
        fill_translucent.paint(&mut pixmap.as_mut(), 1.0);
        // tiny-skia stores premultiplied colour
        assert_eq!(pixel(&pixmap, 0, 0)[3], 128);
    }
}
