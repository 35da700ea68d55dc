//! Vase scene layout

use std::rc::Rc;

use prism_engine::foundation::math::{constants::TAU, utils, Vec3};
use prism_engine::render::{GameObjectId, World};

use crate::config::ModelPaths;

/// Intensity of each orbiting light
const LIGHT_INTENSITY: f32 = 0.2;

const LIGHT_COLORS: [[f32; 3]; 6] = [
    [1.0, 0.1, 0.1],
    [0.1, 0.1, 1.0],
    [0.1, 1.0, 0.1],
    [1.0, 1.0, 0.1],
    [0.1, 1.0, 1.0],
    [1.0, 1.0, 1.0],
];

/// Ids of everything the scene created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneIds {
    pub flat_vase: GameObjectId,
    pub smooth_vase: GameObjectId,
    pub floor: GameObjectId,
    pub lights: Vec<GameObjectId>,
}

/// Add two vases, a floor and a ring of coloured lights to `world`
///
/// `load` turns a model path into a shared mesh; the first failure aborts
/// before anything is inserted.
pub fn populate<M, E, F>(world: &mut World<M>, paths: &ModelPaths, mut load: F) -> Result<SceneIds, E>
where
    F: FnMut(&str) -> Result<Rc<M>, E>,
{
    let flat_model = load(&paths.flat_vase)?;
    let smooth_model = load(&paths.smooth_vase)?;
    let floor_model = load(&paths.floor)?;

    let mut flat_vase = world.create_game_object();
    flat_vase.model = Some(flat_model);
    flat_vase.transform.translation = Vec3::new(-0.5, 0.5, 0.0);
    flat_vase.transform.scale = Vec3::new(3.0, 1.5, 3.0);
    let flat_vase = world.insert(flat_vase);

    let mut smooth_vase = world.create_game_object();
    smooth_vase.model = Some(smooth_model);
    smooth_vase.transform.translation = Vec3::new(0.5, 0.5, 0.0);
    smooth_vase.transform.scale = Vec3::new(3.0, 1.5, 3.0);
    let smooth_vase = world.insert(smooth_vase);

    let mut floor = world.create_game_object();
    floor.model = Some(floor_model);
    floor.transform.translation = Vec3::new(0.0, 0.5, 0.0);
    floor.transform.scale = Vec3::new(3.0, 1.0, 3.0);
    let floor = world.insert(floor);

    let lights = LIGHT_COLORS
        .iter()
        .enumerate()
        .map(|(i, color)| {
            let mut light = world.make_default_point_light(LIGHT_INTENSITY);
            light.color = Vec3::from(*color);
            let angle = i as f32 * TAU / LIGHT_COLORS.len() as f32;
            light.transform.translation =
                utils::rotate_about_axis(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(0.0, -1.0, 0.0), angle);
            world.insert(light)
        })
        .collect();

    log::info!("[SCENE] Populated with {} objects", world.len());
    Ok(SceneIds {
        flat_vase,
        smooth_vase,
        floor,
        lights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use prism_engine::render::systems::{back_to_front, update_lights};
    use prism_engine::render::GlobalUbo;

    fn build() -> (World<String>, SceneIds) {
        let mut world = World::new();
        let ids = populate(&mut world, &ModelPaths::default(), |path| {
            Ok::<_, ()>(Rc::new(path.to_string()))
        })
        .expect("scene builds");
        (world, ids)
    }

    #[test]
    fn test_scene_contents() {
        let (world, ids) = build();
        assert_eq!(world.len(), 9);
        assert_eq!(ids.lights.len(), 6);

        let floor = world.get(ids.floor).expect("floor");
        assert_eq!(floor.model.as_deref().map(String::as_str), Some("resources/models/quad.obj"));
        assert_relative_eq!(floor.transform.scale, Vec3::new(3.0, 1.0, 3.0));

        let smooth = world.get(ids.smooth_vase).expect("smooth vase");
        assert_relative_eq!(smooth.transform.translation, Vec3::new(0.5, 0.5, 0.0));
        assert!(!smooth.is_light());

        for id in &ids.lights {
            let light = world.get(*id).expect("light");
            assert!(light.is_light() && !light.is_drawable());
            assert_relative_eq!(light.point_light.map(|p| p.light_intensity).unwrap_or(0.0), 0.2);
            // Every light sits at the same height and radius
            let position = light.transform.translation;
            assert_relative_eq!(position.y, -1.0, epsilon = 1e-6);
            assert_relative_eq!(position.xz().norm(), 2f32.sqrt(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_first_light_is_red_at_start_position() {
        let (world, ids) = build();
        let first = world.get(ids.lights[0]).expect("light");
        assert_relative_eq!(first.color, Vec3::new(1.0, 0.1, 0.1));
        assert_relative_eq!(first.transform.translation, Vec3::new(-1.0, -1.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_load_failure_inserts_nothing() {
        let mut world = World::<String>::new();
        let result = populate(&mut world, &ModelPaths::default(), |path| {
            if path.ends_with("quad.obj") {
                Err(format!("missing {}", path))
            } else {
                Ok(Rc::new(path.to_string()))
            }
        });
        assert!(result.is_err());
        assert!(world.is_empty());
    }

    #[test]
    fn test_frame_update_moves_all_lights() {
        let (mut world, ids) = build();
        let before: Vec<Vec3> = ids
            .lights
            .iter()
            .map(|id| world.get(*id).expect("light").transform.translation)
            .collect();

        let dt = 0.016;
        let mut ubo = GlobalUbo::default();
        update_lights(dt, world.objects_mut(), &mut ubo).expect("six lights fit");
        assert_eq!(ubo.num_lights, 6);

        for (id, old) in ids.lights.iter().zip(&before) {
            let new = world.get(*id).expect("light").transform.translation;
            let expected = utils::rotate_about_axis(*old, Vec3::new(0.0, -1.0, 0.0), dt);
            assert_relative_eq!(new, expected, epsilon = 1e-6);
        }
        // UBO entries follow id order, which is creation order
        assert_relative_eq!(ubo.point_lights[0].color[0], 1.0);
        assert_relative_eq!(ubo.point_lights[1].color[2], 1.0);

        let order = back_to_front(world.objects(), Vec3::new(0.0, 0.0, -2.5));
        assert_eq!(order.len(), 6);
    }
}
