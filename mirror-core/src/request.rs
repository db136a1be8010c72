//! Request verbs understood by the mirror.

use std::str::FromStr;

use crate::SyncError;

/// Verb name used for the startup scene bootstrap.
pub const SCENE_INFO: &str = "scene_info";

/// A recognized request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestVerb {
    /// Describe an entity (answered for lights).
    EntityInfo,
    /// Remove an entity and everything derived from it.
    EntityDelete,
    /// Show collision visuals.
    ShowCollision,
    /// Hide collision visuals.
    HideCollision,
    /// Show joint helpers.
    ShowJoints,
    /// Hide joint helpers.
    HideJoints,
    /// Show center-of-mass helpers.
    ShowCom,
    /// Hide center-of-mass helpers.
    HideCom,
    /// Set transparency from `dbl_data`.
    SetTransparency,
    /// Show the skeleton when `dbl_data == 1.0`, hide otherwise.
    ShowSkeleton,
    /// Full scene request; answered by the simulation, not the mirror.
    SceneInfo,
}

impl RequestVerb {
    /// Wire name of the verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EntityInfo => "entity_info",
            Self::EntityDelete => "entity_delete",
            Self::ShowCollision => "show_collision",
            Self::HideCollision => "hide_collision",
            Self::ShowJoints => "show_joints",
            Self::HideJoints => "hide_joints",
            Self::ShowCom => "show_com",
            Self::HideCom => "hide_com",
            Self::SetTransparency => "set_transparency",
            Self::ShowSkeleton => "show_skeleton",
            Self::SceneInfo => SCENE_INFO,
        }
    }
}

impl FromStr for RequestVerb {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "entity_info" => Self::EntityInfo,
            "entity_delete" => Self::EntityDelete,
            "show_collision" => Self::ShowCollision,
            "hide_collision" => Self::HideCollision,
            "show_joints" => Self::ShowJoints,
            "hide_joints" => Self::HideJoints,
            "show_com" => Self::ShowCom,
            "hide_com" => Self::HideCom,
            "set_transparency" => Self::SetTransparency,
            "show_skeleton" => Self::ShowSkeleton,
            SCENE_INFO => Self::SceneInfo,
            other => return Err(SyncError::UnknownVerb(other.to_string())),
        })
    }
}

impl std::fmt::Display for RequestVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
