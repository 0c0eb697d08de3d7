//! Analytic scene and ray casting

use contracts::{PrimitiveConfig, SceneConfig};
use nalgebra::{Point3, Vector3};

/// Smallest accepted hit distance
const HIT_EPSILON: f32 = 1e-4;

/// Ray hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Distance along the (unit) ray
    pub distance: f32,
    /// Surface reflectivity
    pub reflectivity: f32,
}

/// Scene primitive
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Plane {
        normal: Vector3<f32>,
        offset: f32,
        reflectivity: f32,
    },
    Sphere {
        center: Point3<f32>,
        radius: f32,
        reflectivity: f32,
    },
    Box {
        min: Point3<f32>,
        max: Point3<f32>,
        reflectivity: f32,
    },
}

impl Primitive {
    /// Plane through `point` with the given normal
    pub fn plane(normal: Vector3<f32>, point: Point3<f32>, reflectivity: f32) -> Self {
        let normal = normal.normalize();
        Primitive::Plane {
            normal,
            offset: normal.dot(&point.coords),
            reflectivity,
        }
    }

    pub fn sphere(center: Point3<f32>, radius: f32, reflectivity: f32) -> Self {
        Primitive::Sphere {
            center,
            radius,
            reflectivity,
        }
    }

    fn reflectivity(&self) -> f32 {
        match self {
            Primitive::Plane { reflectivity, .. }
            | Primitive::Sphere { reflectivity, .. }
            | Primitive::Box { reflectivity, .. } => *reflectivity,
        }
    }

    /// Nearest positive hit distance along a unit direction
    pub fn intersect(&self, origin: &Point3<f32>, dir: &Vector3<f32>) -> Option<f32> {
        match self {
            Primitive::Plane { normal, offset, .. } => {
                let denom = normal.dot(dir);
                if denom.abs() < 1e-9 {
                    return None;
                }
                let t = (offset - normal.dot(&origin.coords)) / denom;
                (t > HIT_EPSILON).then_some(t)
            }
            Primitive::Sphere { center, radius, .. } => {
                let oc = origin - center;
                let b = oc.dot(dir);
                let c = oc.norm_squared() - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let sq = disc.sqrt();
                let near = -b - sq;
                let far = -b + sq;
                if near > HIT_EPSILON {
                    Some(near)
                } else if far > HIT_EPSILON {
                    Some(far)
                } else {
                    None
                }
            }
            Primitive::Box { min, max, .. } => {
                let mut t_enter = f32::NEG_INFINITY;
                let mut t_exit = f32::INFINITY;
                for axis in 0..3 {
                    let o = origin[axis];
                    let d = dir[axis];
                    if d.abs() < 1e-12 {
                        if o < min[axis] || o > max[axis] {
                            return None;
                        }
                        continue;
                    }
                    let inv = 1.0 / d;
                    let t0 = (min[axis] - o) * inv;
                    let t1 = (max[axis] - o) * inv;
                    t_enter = t_enter.max(t0.min(t1));
                    t_exit = t_exit.min(t0.max(t1));
                }
                if t_exit < t_enter.max(HIT_EPSILON) {
                    return None;
                }
                // origin inside the box: report the exit face
                Some(if t_enter > HIT_EPSILON { t_enter } else { t_exit })
            }
        }
    }
}

impl From<&PrimitiveConfig> for Primitive {
    fn from(config: &PrimitiveConfig) -> Self {
        match *config {
            PrimitiveConfig::Plane {
                normal,
                offset,
                reflectivity,
            } => {
                let n = Vector3::from(normal);
                let len = n.norm();
                // keep `normal · p = offset` when normalizing
                let (normal, offset) = if len > 0.0 {
                    (n / len, offset / len)
                } else {
                    (Vector3::z(), offset)
                };
                Primitive::Plane {
                    normal,
                    offset,
                    reflectivity,
                }
            }
            PrimitiveConfig::Sphere {
                center,
                radius,
                reflectivity,
            } => Primitive::Sphere {
                center: Point3::from(center),
                radius,
                reflectivity,
            },
            PrimitiveConfig::Box {
                min,
                max,
                reflectivity,
            } => {
                let a = Point3::from(min);
                let b = Point3::from(max);
                Primitive::Box {
                    min: a.inf(&b),
                    max: a.sup(&b),
                    reflectivity,
                }
            }
        }
    }
}

/// Collection of primitives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    primitives: Vec<Primitive>,
}

impl Scene {
    pub fn new(primitives: Vec<Primitive>) -> Self {
        Self { primitives }
    }

    pub fn from_config(config: &SceneConfig) -> Self {
        Self::new(config.primitives.iter().map(Primitive::from).collect())
    }

    pub fn push(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Nearest hit within `max_distance`
    pub fn raycast(
        &self,
        origin: &Point3<f32>,
        dir: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<Hit> {
        self.primitives
            .iter()
            .filter_map(|p| {
                p.intersect(origin, dir).map(|distance| Hit {
                    distance,
                    reflectivity: p.reflectivity(),
                })
            })
            .filter(|hit| hit.distance <= max_distance)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_hit_distance() {
        let ground = Primitive::plane(Vector3::z(), Point3::new(0.0, 0.0, -2.0), 0.3);
        let dir = Vector3::new(1.0, 0.0, -1.0).normalize();
        let t = ground.intersect(&Point3::origin(), &dir).unwrap();
        assert!((t - 2.0 * 2f32.sqrt()).abs() < 1e-4);

        // parallel and receding rays miss
        assert!(ground.intersect(&Point3::origin(), &Vector3::x()).is_none());
        assert!(ground.intersect(&Point3::origin(), &Vector3::z()).is_none());
    }

    #[test]
    fn test_sphere_from_inside() {
        let shell = Primitive::sphere(Point3::origin(), 12.0, 0.8);
        let dir = Vector3::new(0.3, -0.4, 0.5).normalize();
        let t = shell.intersect(&Point3::origin(), &dir).unwrap();
        assert!((t - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_box_outside_and_inside() {
        let cube = Primitive::from(&PrimitiveConfig::Box {
            min: [1.0, -1.0, -1.0],
            max: [3.0, 1.0, 1.0],
            reflectivity: 0.5,
        });
        let t = cube.intersect(&Point3::origin(), &Vector3::x()).unwrap();
        assert!((t - 1.0).abs() < 1e-5);

        let t = cube.intersect(&Point3::new(2.0, 0.0, 0.0), &Vector3::x()).unwrap();
        assert!((t - 1.0).abs() < 1e-5);

        assert!(cube.intersect(&Point3::origin(), &Vector3::y()).is_none());
    }

    #[test]
    fn test_scene_nearest_and_limit() {
        let scene = Scene::new(vec![
            Primitive::plane(Vector3::x(), Point3::new(10.0, 0.0, 0.0), 0.2),
            Primitive::plane(Vector3::x(), Point3::new(5.0, 0.0, 0.0), 0.9),
        ]);
        let hit = scene
            .raycast(&Point3::origin(), &Vector3::x(), 100.0)
            .unwrap();
        assert!((hit.distance - 5.0).abs() < 1e-5);
        assert_eq!(hit.reflectivity, 0.9);

        assert!(scene.raycast(&Point3::origin(), &Vector3::x(), 4.0).is_none());
    }

    #[test]
    fn test_plane_config_normalizes_offset() {
        let plane = Primitive::from(&PrimitiveConfig::Plane {
            normal: [0.0, 0.0, 2.0],
            offset: -4.0,
            reflectivity: 0.5,
        });
        // 2z = -4  ->  z = -2
        let t = plane
            .intersect(&Point3::origin(), &-Vector3::z())
            .unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }
}
