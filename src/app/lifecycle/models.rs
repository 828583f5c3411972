use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    Destroyed,
    #[default]
    Initialized,
    Created,
    Started,
    Resumed,
}

impl ActivityState {
    /// First true flag wins: resumed, then stopped, then finished.
    pub fn derive(resumed: bool, stopped: bool, finished: bool) -> Self {
        if resumed {
            Self::Resumed
        } else if stopped {
            Self::Created
        } else if finished {
            Self::Destroyed
        } else {
            Self::Initialized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destroyed => "DESTROYED",
            Self::Initialized => "INITIALIZED",
            Self::Created => "CREATED",
            Self::Started => "STARTED",
            Self::Resumed => "RESUMED",
        }
    }
}

pub const FRAGMENT_STATE_STARTED: i32 = 5;

/// Name of an androidx `Fragment.mState` ordinal.
pub fn fragment_state_name(state: i32) -> &'static str {
    match state {
        -1 => "INITIALIZING",
        0 => "ATTACHED",
        1 => "CREATED",
        2 => "VIEW_CREATED",
        3 => "AWAITING_EXIT_EFFECTS",
        4 => "ACTIVITY_CREATED",
        5 => "STARTED",
        6 => "AWAITING_ENTER_EFFECTS",
        7 => "RESUMED",
        _ => "UNKNOWN",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FragmentInfo {
    pub class_name: String,
    /// Identity hash printed between braces, unique per instance within one dump.
    pub instance_id: String,
    pub tag: Option<String>,
    pub who: String,
    pub state: i32,
    pub hidden: bool,
    pub user_visible_hint: bool,
    pub container: Option<String>,
    pub level: u32,
    pub children: Vec<FragmentInfo>,
}

impl FragmentInfo {
    pub fn state_name(&self) -> &'static str {
        fragment_state_name(self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state >= FRAGMENT_STATE_STARTED && !self.hidden
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(FragmentInfo::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityRecord {
    pub class_name: String,
    pub package_name: String,
    pub pid: Option<u32>,
    pub resumed: bool,
    pub stopped: bool,
    pub finished: bool,
    pub state: ActivityState,
    pub level: u32,
    pub fragments: Vec<FragmentInfo>,
}

impl ActivityRecord {
    pub fn short_name(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(self.class_name.as_str())
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.iter().map(FragmentInfo::count).sum()
    }
}

/// Shared read-only view over both node kinds of the lifecycle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleComponent<'a> {
    Activity(&'a ActivityRecord),
    Fragment(&'a FragmentInfo),
}

impl<'a> LifecycleComponent<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Self::Activity(activity) => &activity.class_name,
            Self::Fragment(fragment) => &fragment.class_name,
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            Self::Activity(activity) => activity.level,
            Self::Fragment(fragment) => fragment.level,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::Activity(activity) => activity.state == ActivityState::Resumed,
            Self::Fragment(fragment) => fragment.is_running(),
        }
    }

    pub fn state_text(&self) -> String {
        match self {
            Self::Activity(activity) => activity.state.as_str().to_string(),
            Self::Fragment(fragment) if fragment.hidden => {
                format!("{} (hidden)", fragment.state_name())
            }
            Self::Fragment(fragment) => fragment.state_name().to_string(),
        }
    }

    pub fn children(&self) -> Vec<LifecycleComponent<'a>> {
        let fragments = match *self {
            Self::Activity(activity) => &activity.fragments,
            Self::Fragment(fragment) => &fragment.children,
        };
        fragments.iter().map(LifecycleComponent::Fragment).collect()
    }

    /// Depth-first, parents before children.
    pub fn walk(&self) -> Vec<LifecycleComponent<'a>> {
        let mut out = vec![*self];
        for child in self.children() {
            out.extend(child.walk());
        }
        out
    }
}

pub fn lifecycle_roots(activities: &[ActivityRecord]) -> Vec<LifecycleComponent<'_>> {
    activities.iter().map(LifecycleComponent::Activity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumed_wins_over_everything() {
        assert_eq!(ActivityState::derive(true, true, true), ActivityState::Resumed);
        assert_eq!(ActivityState::derive(false, true, true), ActivityState::Created);
        assert_eq!(ActivityState::derive(false, false, true), ActivityState::Destroyed);
        assert_eq!(ActivityState::derive(false, false, false), ActivityState::Initialized);
    }

    #[test]
    fn fragment_state_names_cover_the_lifecycle() {
        assert_eq!(fragment_state_name(-1), "INITIALIZING");
        assert_eq!(fragment_state_name(7), "RESUMED");
        assert_eq!(fragment_state_name(42), "UNKNOWN");
    }

    #[test]
    fn component_view_walks_the_tree() {
        let activity = ActivityRecord {
            class_name: "com.example.MainActivity".to_string(),
            package_name: "com.example".to_string(),
            state: ActivityState::Resumed,
            fragments: vec![FragmentInfo {
                class_name: "HostFragment".to_string(),
                state: 7,
                level: 1,
                children: vec![FragmentInfo {
                    class_name: "ChildFragment".to_string(),
                    state: 1,
                    hidden: true,
                    level: 2,
                    ..FragmentInfo::default()
                }],
                ..FragmentInfo::default()
            }],
            ..ActivityRecord::default()
        };
        assert_eq!(activity.short_name(), "MainActivity");
        assert_eq!(activity.fragment_count(), 2);

        let roots = lifecycle_roots(std::slice::from_ref(&activity));
        let names: Vec<&str> = roots[0].walk().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["com.example.MainActivity", "HostFragment", "ChildFragment"]);

        let nodes = roots[0].walk();
        assert!(nodes[0].is_running());
        assert!(nodes[1].is_running());
        assert!(!nodes[2].is_running());
        assert_eq!(nodes[2].state_text(), "CREATED (hidden)");
        assert_eq!(nodes[2].level(), 2);
    }
}
