//! Choice of the UV shells that belong in the template.
//!
//! Models expose many material targets (paint, glass, interior, wheels...).
//! Target keys are scored with substring heuristics and the winner, together
//! with closely scored companions, decides which meshes are painted.

use std::collections::BTreeSet;

use fxhash::FxHashSet;
use log::{debug, info, warn};

use super::types::{TemplateMap, UvShell};

/// Companions must score within this distance of the winner...
const COMPANION_WINDOW: i32 = 20;
/// ...and never below this floor.
const COMPANION_FLOOR: i32 = 150;

const BOOSTS: &[(&str, i32)] = &[
    ("livery", 240),
    ("paint", 200),
    ("carpaint", 40),
    ("wrap", 110),
    ("decal", 120),
    ("logo", 100),
];

const PENALTIES: &[(&str, i32)] = &[
    ("glass", -320),
    ("window", -260),
    ("interior", -220),
    ("wheel", -220),
    ("tyre", -180),
    ("tire", -180),
];

const SIGN_SLOT_BOOST: i32 = 160;

/// Score of a target key; higher is more likely to be the paintable body.
pub fn score_target(key: &str) -> i32 {
    let key = key.to_ascii_lowercase();
    let mut score = 0;
    for (token, boost) in BOOSTS.iter().chain(PENALTIES) {
        if key.contains(token) {
            score += boost;
        }
    }
    if has_sign_slot(&key) {
        score += SIGN_SLOT_BOOST;
    }
    score
}

/// `sign1`, `sign_2`, `sign-3`: numbered decal slots used by vehicle liveries.
fn has_sign_slot(key: &str) -> bool {
    key.match_indices("sign").any(|(i, m)| {
        let rest = key[i + m.len()..].trim_start_matches(['_', '-']);
        rest.starts_with(|c: char| c.is_ascii_digit())
    })
}

/// Target keys sorted by descending score, ties by key.
pub fn rank_targets(map: &TemplateMap) -> Vec<(&str, i32)> {
    let mut ranked: Vec<(&str, i32)> =
        map.targets.keys().map(|k| (k.as_str(), score_target(k))).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

/// Outcome of target resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The winning target first, companions after it in rank order.
    pub targets: Vec<String>,
    pub mesh_names: BTreeSet<String>,
}

/// Resolve the winning target set.
///
/// An explicit `preferred` target present in the map wins outright, then the
/// inferred livery target, then the best scored key. Returns `None` when the
/// map has no targets.
pub fn resolve_targets(map: &TemplateMap, preferred: Option<&str>) -> Option<Selection> {
    let ranked = rank_targets(map);
    let is_target = |k: &&str| map.targets.contains_key(*k);

    let winner = preferred
        .filter(is_target)
        .or_else(|| map.inference.livery_target.as_deref().filter(is_target))
        .or_else(|| ranked.first().map(|(k, _)| *k))?;
    let winner_score = score_target(winner);
    let is_companion = |s: i32| (s - winner_score).abs() <= COMPANION_WINDOW && s >= COMPANION_FLOOR;

    let mut targets = vec![winner.to_string()];
    targets.extend(
        ranked
            .iter()
            .filter(|(k, s)| *k != winner && is_companion(*s))
            .map(|(k, _)| k.to_string()),
    );

    let mesh_names = targets
        .iter()
        .filter_map(|t| map.targets.get(t))
        .flatten()
        .map(|m| m.mesh_name.clone())
        .collect();
    Some(Selection { targets, mesh_names })
}

/// Filter `shells` down to the resolved target set.
///
/// Fails open: when nothing matches (no targets, or mesh names that do not
/// line up with the UV source) every shell is kept.
pub fn select_shells(shells: &[UvShell], map: &TemplateMap, preferred: Option<&str>) -> Vec<UvShell> {
    let Some(selection) = resolve_targets(map, preferred) else {
        warn!("template map has no targets, using all {} shells", shells.len());
        return shells.to_vec();
    };
    info!("template targets: {:?}", selection.targets);

    let names: FxHashSet<&str> = selection.mesh_names.iter().map(String::as_str).collect();
    let selected: Vec<UvShell> = shells
        .iter()
        .filter(|s| names.contains(s.mesh_name.as_str()))
        .cloned()
        .collect();
    if selected.is_empty() {
        warn!(
            "no UV shell matches meshes {:?}, falling back to all {} shells",
            selection.mesh_names,
            shells.len()
        );
        return shells.to_vec();
    }
    debug!("selected {}/{} shells", selected.len(), shells.len());
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::types::{TargetMesh, TemplateMesh, UvTriangles};
    use crate::util_2d::Vector2;

    fn map_of(entries: &[(&str, &[&str])]) -> TemplateMap {
        let mut map = TemplateMap::default();
        for (key, meshes) in entries {
            map.targets.insert(
                key.to_string(),
                meshes.iter().map(|m| TargetMesh { mesh_name: m.to_string() }).collect(),
            );
        }
        map
    }

    fn shell(name: &str) -> UvShell {
        let mesh = TemplateMesh {
            mesh_name: name.into(),
            triangles: UvTriangles(vec![[
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
            ]]),
            ..Default::default()
        };
        UvShell::from_mesh(&mesh, 0).unwrap()
    }

    #[test]
    fn test_scores() {
        assert!(score_target("material:vehicle_paint3") >= COMPANION_FLOOR);
        assert!(score_target("material:vehglass") < 0);
        assert!(score_target("Material:CarPaint") > score_target("material:paint"));
        assert!(score_target("material:sign_2") > 0);
        assert_eq!(score_target("material:signal"), 0);
        assert!(score_target("material:wheel_paint") < score_target("material:paint"));
    }

    #[test]
    fn test_glass_never_selected() {
        let map = map_of(&[
            ("material:vehicle_paint3", &["body"]),
            ("material:vehglass", &["windows"]),
        ]);
        let selection = resolve_targets(&map, None).unwrap();
        assert_eq!(selection.targets, vec!["material:vehicle_paint3".to_string()]);
        assert!(selection.mesh_names.contains("body"));
        assert!(!selection.mesh_names.contains("windows"));
    }

    #[test]
    fn test_companions_travel_together() {
        let map = map_of(&[
            ("material:paint1", &["body"]),
            ("material:paint2", &["doors"]),
            ("material:logo", &["badge"]),
            ("material:interior", &["seats"]),
        ]);
        let selection = resolve_targets(&map, None).unwrap();
        assert_eq!(selection.targets, vec!["material:paint1", "material:paint2"]);
        assert_eq!(
            selection.mesh_names.iter().collect::<Vec<_>>(),
            vec!["body", "doors"]
        );
    }

    #[test]
    fn test_preferred_and_inferred() {
        let mut map = map_of(&[("material:paint", &["body"]), ("material:misc", &["trim"])]);
        let s = resolve_targets(&map, Some("material:misc")).unwrap();
        assert_eq!(s.targets[0], "material:misc");

        // Unknown preferred key is ignored.
        let s = resolve_targets(&map, Some("material:nope")).unwrap();
        assert_eq!(s.targets[0], "material:paint");

        map.inference.livery_target = Some("material:misc".into());
        let s = resolve_targets(&map, None).unwrap();
        assert_eq!(s.targets[0], "material:misc");
    }

    #[test]
    fn test_low_scored_winner_keeps_high_scores_out() {
        let mut map = map_of(&[
            ("material:misc", &["trim"]),
            ("material:paint", &["body"]),
            ("material:decal_logo", &["badge"]),
        ]);
        let s = resolve_targets(&map, Some("material:misc")).unwrap();
        assert_eq!(s.targets, vec!["material:misc"]);
        assert_eq!(s.mesh_names.iter().collect::<Vec<_>>(), vec!["trim"]);

        map.inference.livery_target = Some("material:misc".into());
        let s = resolve_targets(&map, None).unwrap();
        assert_eq!(s.targets, vec!["material:misc"]);

        // paint (200) is within reach of decal_logo (220).
        let s = resolve_targets(&map, Some("material:paint")).unwrap();
        assert_eq!(s.targets, vec!["material:paint", "material:decal_logo"]);
    }

    #[test]
    fn test_companions_respect_floor() {
        let map = map_of(&[("material:wrap_a", &["a"]), ("material:wrap_b", &["b"])]);
        assert_eq!(score_target("material:wrap_b"), 110);
        let s = resolve_targets(&map, None).unwrap();
        assert_eq!(s.targets, vec!["material:wrap_a"]);
    }

    #[test]
    fn test_ties_break_on_key() {
        let map = map_of(&[("b_misc", &["b"]), ("a_misc", &["a"])]);
        let ranked = rank_targets(&map);
        assert_eq!(ranked[0].0, "a_misc");
    }

    #[test]
    fn test_select_shells_fails_open() {
        let shells = vec![shell("body"), shell("windows")];
        let map = map_of(&[("material:paint", &["chassis_lod0"])]);
        let selected = select_shells(&shells, &map, None);
        assert_eq!(selected.len(), 2);

        let map = map_of(&[("material:paint", &["body"]), ("material:glass", &["windows"])]);
        let selected = select_shells(&shells, &map, None);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].mesh_name, "body");
    }
}
