use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::topology::connected_components;
use crate::util_2d::{clamp01, Vector2};

/// UV triangles of one mesh as produced by the model parser.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSource {
    #[serde(default)]
    pub meshes: Vec<TemplateMesh>,
    #[serde(default)]
    pub source: SourceInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub file_name: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMesh {
    pub mesh_name: String,
    #[serde(default)]
    pub triangles: UvTriangles,
    pub shell_index: Option<u32>,
    pub shell_name: Option<String>,
    pub rectangles: Option<Vec<UvRect>>,
    pub bounds: Option<UvRect>,
}

/// Material/mesh targets of a model, keyed by target identifier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMap {
    #[serde(default)]
    pub targets: BTreeMap<String, Vec<TargetMesh>>,
    #[serde(default)]
    pub inference: TargetInference,
    #[serde(default)]
    pub source: SourceInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMesh {
    pub mesh_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInference {
    pub livery_target: Option<String>,
}

/// Axis aligned rectangle in UV space.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UvRect {
    pub min_u: f64,
    pub min_v: f64,
    pub max_u: f64,
    pub max_v: f64,
}

impl UvRect {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector2>) -> Option<UvRect> {
        let mut it = points.into_iter();
        let first = it.next()?;
        let init = UvRect { min_u: first.x, min_v: first.y, max_u: first.x, max_v: first.y };
        Some(it.fold(init, |r, p| UvRect {
            min_u: r.min_u.min(p.x),
            min_v: r.min_v.min(p.y),
            max_u: r.max_u.max(p.x),
            max_v: r.max_v.max(p.y),
        }))
    }

    pub fn width(&self) -> f64 {
        self.max_u - self.min_u
    }

    pub fn height(&self) -> f64 {
        self.max_v - self.min_v
    }

    pub fn is_finite(&self) -> bool {
        [self.min_u, self.min_v, self.max_u, self.max_v].iter().all(|x| x.is_finite())
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new((self.min_u + self.max_u) * 0.5, (self.min_v + self.max_v) * 0.5)
    }

    pub fn contains(&self, p: Vector2) -> bool {
        (self.min_u..=self.max_u).contains(&p.x) && (self.min_v..=self.max_v).contains(&p.y)
    }

    /// Corners in ring order, starting at (min_u, min_v).
    pub fn corners(&self) -> [Vector2; 4] {
        [
            Vector2::new(self.min_u, self.min_v),
            Vector2::new(self.max_u, self.min_v),
            Vector2::new(self.max_u, self.max_v),
            Vector2::new(self.min_u, self.max_v),
        ]
    }
}

/// Triangle list in any of the shapes the parser emits: a flat number list,
/// a list of `[u, v]` pairs, or a list of `[[u, v]; 3]` triangles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UvTriangles(pub Vec<[Vector2; 3]>);

impl<'de> Deserialize<'de> for UvTriangles {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flat(Vec<f64>),
            Pairs(Vec<[f64; 2]>),
            Triangles(Vec<[[f64; 2]; 3]>),
        }

        let pairs: Vec<[f64; 2]> = match Raw::deserialize(deserializer)? {
            Raw::Flat(v) => v.chunks_exact(2).map(|c| [c[0], c[1]]).collect(),
            Raw::Pairs(v) => v,
            Raw::Triangles(v) => v.into_iter().flatten().collect(),
        };
        let tris = pairs
            .chunks_exact(3)
            .map(|t| {
                [
                    Vector2::new(t[0][0], t[0][1]),
                    Vector2::new(t[1][0], t[1][1]),
                    Vector2::new(t[2][0], t[2][1]),
                ]
            })
            .collect();
        Ok(UvTriangles(tris))
    }
}

/// One UV island of a mesh, immutable for the duration of a generation call.
#[derive(Debug, Clone)]
pub struct UvShell {
    pub mesh_name: String,
    /// Shell index, shell name, or the mesh ordinal (with an island suffix
    /// when the mesh splits) when neither is given.
    pub shell_id: String,
    pub triangles: Vec<[Vector2; 3]>,
    pub bounds: UvRect,
    pub rectangles: Vec<UvRect>,
}

fn finite_triangles(mesh: &TemplateMesh) -> Vec<[Vector2; 3]> {
    mesh.triangles
        .0
        .iter()
        .filter(|t| t.iter().all(|p| p.x.is_finite() && p.y.is_finite()))
        .copied()
        .collect()
}

fn rectangle_hints(mesh: &TemplateMesh) -> impl Iterator<Item = UvRect> + '_ {
    mesh.rectangles.iter().flatten().filter(|r| r.is_finite()).copied()
}

impl UvShell {
    /// Shells of a parsed mesh.
    ///
    /// A mesh that names its shell (`shellIndex` or `shellName`) is a single
    /// shell. Otherwise its triangles are split into connected UV islands,
    /// identified as `<ordinal>.<island>` when there is more than one. Each
    /// rectangle hint goes to the island whose bounds contain its center.
    pub fn split_mesh(mesh: &TemplateMesh, ordinal: usize) -> Vec<UvShell> {
        if mesh.shell_index.is_some() || mesh.shell_name.is_some() {
            return UvShell::from_mesh(mesh, ordinal).into_iter().collect();
        }
        let triangles = finite_triangles(mesh);
        let components = connected_components(&triangles);
        if components.len() < 2 {
            return UvShell::from_mesh(mesh, ordinal).into_iter().collect();
        }
        log::debug!("mesh {} has {} UV islands", mesh.mesh_name, components.len());

        components
            .iter()
            .enumerate()
            .filter_map(|(island, indices)| {
                let triangles: Vec<[Vector2; 3]> = indices.iter().map(|&i| triangles[i]).collect();
                let bounds = UvRect::from_points(triangles.iter().flatten())?;
                let rectangles = rectangle_hints(mesh).filter(|r| bounds.contains(r.center())).collect();
                Some(UvShell {
                    mesh_name: mesh.mesh_name.clone(),
                    shell_id: format!("{ordinal}.{island}"),
                    triangles,
                    bounds,
                    rectangles,
                })
            })
            .collect()
    }

    /// Build a single shell from a parsed mesh, dropping triangles with
    /// non-finite coordinates. Returns `None` when no triangle survives.
    pub fn from_mesh(mesh: &TemplateMesh, ordinal: usize) -> Option<UvShell> {
        let triangles = finite_triangles(mesh);
        if triangles.is_empty() {
            return None;
        }
        let bounds = match mesh.bounds {
            Some(b) if b.is_finite() => b,
            _ => UvRect::from_points(triangles.iter().flatten())?,
        };
        let shell_id = match (&mesh.shell_index, &mesh.shell_name) {
            (Some(i), _) => i.to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => ordinal.to_string(),
        };
        let rectangles = rectangle_hints(mesh).collect();
        Some(UvShell {
            mesh_name: mesh.mesh_name.clone(),
            shell_id,
            triangles,
            bounds,
            rectangles,
        })
    }

    /// Identity used for palette hashing: `meshName::shellId`.
    pub fn key(&self) -> String {
        format!("{}::{}", self.mesh_name, self.shell_id)
    }

    pub fn points(&self) -> impl Iterator<Item = Vector2> + '_ {
        self.triangles.iter().flatten().copied()
    }

    /// A shell is worth painting if at least one triangle keeps some extent
    /// once its UVs are clamped into the unit square.
    pub fn is_eligible(&self) -> bool {
        let clamp = |p: &Vector2| (clamp01(p.x), clamp01(p.y));
        self.triangles.iter().any(|t| {
            let a = clamp(&t[0]);
            a != clamp(&t[1]) || a != clamp(&t[2])
        })
    }
}
