//! Light scoring and ordering against a draw target

use bevy_ecs::prelude::*;
use glam::Vec3;

use crate::scene::{Caster, CasterKind, Light, Transform};

/// Relevance of a light to a target position; higher is more relevant.
///
/// Directional lights score `+inf`. Point and spot lights score
/// `intensity / distance`, always finite: a light sitting on the target
/// scores `f32::MAX`.
pub fn score_light(light: &Light, caster: &Caster, position: Vec3, target: Vec3) -> f32 {
    if caster.kind == CasterKind::Directional {
        return f32::INFINITY;
    }
    let distance = position.distance(target);
    if distance <= 0.0 {
        return f32::MAX;
    }
    let score = light.intensity / distance;
    if score.is_finite() {
        score
    } else {
        f32::MAX
    }
}

/// Score a light entity, or `None` if it lacks a component needed
pub fn score_entity(world: &World, entity: Entity, target: Vec3) -> Option<f32> {
    let light = world.get::<Light>(entity)?;
    let caster = world.get::<Caster>(entity)?;
    let transform = world.get::<Transform>(entity)?;
    Some(score_light(light, caster, transform.position, target))
}

/// Stable merge sort, descending by score
pub fn sort_lights<T: Copy>(lights: &[(T, f32)]) -> Vec<(T, f32)> {
    if lights.len() <= 1 {
        return lights.to_vec();
    }
    let (left, right) = lights.split_at(lights.len() / 2);
    merge(&sort_lights(left), &sort_lights(right))
}

fn merge<T: Copy>(left: &[(T, f32)], right: &[(T, f32)]) -> Vec<(T, f32)> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        // ties go left
        if left[i].1 >= right[j].1 {
            merged.push(left[i]);
            i += 1;
        } else {
            merged.push(right[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}

/// Score then sort light entities for a target.
///
/// Entities that cannot be scored are left out.
pub fn sort_light_entities(world: &World, lights: &[Entity], target: Vec3) -> Vec<Entity> {
    let scored: Vec<_> = lights
        .iter()
        .filter_map(|&entity| score_entity(world, entity, target).map(|score| (entity, score)))
        .collect();
    sort_lights(&scored).into_iter().map(|(entity, _)| entity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(intensity: f32) -> (Light, Caster) {
        (Light::new(Vec3::ONE, intensity), Caster::point(10.0))
    }

    #[test]
    fn test_directional_beats_any_point() {
        let (light, _) = point(1.0);
        let directional = score_light(&light, &Caster::directional(), Vec3::ZERO, Vec3::ZERO);

        let (bright, caster) = point(f32::MAX);
        let closest = score_light(&bright, &caster, Vec3::new(1e-30, 0.0, 0.0), Vec3::ZERO);
        let touching = score_light(&bright, &caster, Vec3::ZERO, Vec3::ZERO);

        assert!(directional > closest);
        assert!(directional > touching);
    }

    #[test]
    fn test_zero_distance_is_finite() {
        let (light, caster) = point(3.0);
        let score = score_light(&light, &caster, Vec3::ONE, Vec3::ONE);
        assert_eq!(score, f32::MAX);
        assert!(score.is_finite());
    }

    #[test]
    fn test_score_falls_off_with_distance() {
        let (light, caster) = point(2.0);
        let near = score_light(&light, &caster, Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO);
        let far = score_light(&light, &caster, Vec3::new(4.0, 0.0, 0.0), Vec3::ZERO);
        assert_eq!(near, 2.0);
        assert_eq!(far, 0.5);
    }

    #[test]
    fn test_sort_descending_and_stable() {
        let input = [('a', 1.0), ('b', 3.0), ('c', 1.0), ('d', 2.0), ('e', 3.0)];
        let sorted: Vec<_> = sort_lights(&input).into_iter().map(|(c, _)| c).collect();
        assert_eq!(sorted, vec!['b', 'e', 'd', 'a', 'c']);
    }

    #[test]
    fn test_sort_is_permutation() {
        let input: Vec<_> = (0..17).map(|i| (i, ((i * 7) % 5) as f32)).collect();
        let sorted = sort_lights(&input);

        assert_eq!(sorted.len(), input.len());
        assert!(sorted.windows(2).all(|w| w[0].1 >= w[1].1));
        let mut ids: Vec<_> = sorted.iter().map(|(i, _)| *i).collect();
        ids.sort();
        assert_eq!(ids, (0..17).collect::<Vec<_>>());
    }

    #[test]
    fn test_unscorable_entities_dropped() {
        let mut world = World::new();
        let complete = world
            .spawn((Light::default(), Caster::point(5.0), Transform::default()))
            .id();
        let partial = world.spawn(Light::default()).id();

        let sorted = sort_light_entities(&world, &[partial, complete], Vec3::X);
        assert_eq!(sorted, vec![complete]);
    }
}
