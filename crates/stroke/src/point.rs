/// A 2D stroke point, laid out as `vec2<f32>`
pub type Point = glam::Vec2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        let points = [Point::new(1.0, 2.0), Point::new(3.0, 4.0)];
        let floats: &[f32] = bytemuck::cast_slice(&points);
        assert_eq!(floats, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(Point::from([5.0, 6.0]), Point::new(5.0, 6.0));
    }
}
