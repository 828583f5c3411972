use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use super::models::{ActivityRecord, ActivityState, FragmentInfo};

/// A fragment as scraped from one activity chunk, before tree assembly.
#[derive(Debug, Clone, Default)]
struct RawFragment {
    class_name: String,
    instance_id: String,
    tag: Option<String>,
    who: String,
    state: i32,
    hidden: bool,
    user_visible_hint: bool,
    container: Option<String>,
    /// `mParentFragment` as (class, optional identity hash).
    parent: Option<(String, Option<String>)>,
    /// Fragment whose child manager lists this one, found by indentation.
    owner: Option<String>,
}

impl RawFragment {
    fn key(&self) -> String {
        identity_key(&self.class_name, &self.instance_id)
    }
}

fn identity_key(class_name: &str, instance_id: &str) -> String {
    format!("{class_name}{{{instance_id}}}")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn non_null(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "null" {
        None
    } else {
        Some(value.to_string())
    }
}

pub struct LifecycleParser {
    re_activity: Regex,
    re_resumed: Regex,
    re_stopped: Regex,
    re_finished: Regex,
    re_fragment_header: Regex,
    re_added_entry: Regex,
    re_entry_tag: Regex,
    re_tag: Regex,
    re_state: Regex,
    re_hidden: Regex,
    re_user_visible_hint: Regex,
    re_container: Regex,
    re_parent: Regex,
    re_who: Regex,
    re_resumed_activity: Regex,
}

impl Default for LifecycleParser {
    fn default() -> Self {
        Self {
            re_activity: Regex::new(r"ACTIVITY\s+([^/\s]+)/(\S+)(?:.*?\bpid=(\d+))?").unwrap(),
            re_resumed: Regex::new(r"\bmResumed=(true|false)").unwrap(),
            re_stopped: Regex::new(r"\bmStopped=(true|false)").unwrap(),
            re_finished: Regex::new(r"\bmFinished=(true|false)").unwrap(),
            // androidx prints `Class{hash}`, support-library and framework managers `#N: Class{hash #N ...}`.
            re_fragment_header: Regex::new(r"^\s*(?:#\d+:\s*)?([A-Za-z_$][\w$.]*)\{([0-9a-fA-F]+)[}\s]")
                .unwrap(),
            re_added_entry: Regex::new(r"^\s*#\d+:\s*([A-Za-z_$][\w$.]*)\{([0-9a-fA-F]+)[}\s](.*)$")
                .unwrap(),
            re_entry_tag: Regex::new(r"\btag=([^\s)}]+)").unwrap(),
            re_tag: Regex::new(r"\bmTag=(\S+)").unwrap(),
            re_state: Regex::new(r"\bmState=(-?\d+)").unwrap(),
            re_hidden: Regex::new(r"\bmHidden=(true|false)").unwrap(),
            re_user_visible_hint: Regex::new(r"\bmUserVisibleHint=(true|false)").unwrap(),
            re_container: Regex::new(r"\bmContainer=([^{\s]+)").unwrap(),
            re_parent: Regex::new(r"\bmParentFragment=([\w$.]+)(?:\{([0-9a-fA-F]+)[}\s])?").unwrap(),
            re_who: Regex::new(r"\bmWho=(\S+)").unwrap(),
            re_resumed_activity: Regex::new(
                r"(?:mResumedActivity|topResumedActivity|ResumedActivity)\s*[:=]\s*ActivityRecord\{\S+\s+\S+\s+([^/\s]+)/([^\s}]+)",
            )
            .unwrap(),
        }
    }
}

fn qualify(package_name: &str, activity: &str) -> String {
    if activity.starts_with('.') {
        format!("{package_name}{activity}")
    } else {
        activity.to_string()
    }
}

impl LifecycleParser {
    /// Builds one `ActivityRecord` per `ACTIVITY` section of `dumpsys activity <pkg>`,
    /// each carrying its fragment tree. Text before the first section is ignored.
    pub fn parse(&self, raw: &str) -> Vec<ActivityRecord> {
        let lines: Vec<&str> = raw.lines().collect();
        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.trim_start().starts_with("ACTIVITY "))
            .map(|(index, _)| index)
            .collect();

        let mut activities = Vec::with_capacity(starts.len());
        for (position, start) in starts.iter().enumerate() {
            // The last chunk runs through the final line of the dump.
            let end = starts.get(position + 1).copied().unwrap_or(lines.len());
            if let Some(activity) = self.parse_activity(&lines[*start..end]) {
                activities.push(activity);
            }
        }
        activities
    }

    /// `(package, fully qualified activity)` of the resumed activity in `dumpsys activity activities`.
    pub fn parse_resumed_activity(&self, raw: &str) -> Option<(String, String)> {
        let caps = self.re_resumed_activity.captures(raw)?;
        let package_name = caps[1].to_string();
        let activity = qualify(&package_name, &caps[2]);
        Some((package_name, activity))
    }

    fn flag(re: &Regex, text: &str) -> bool {
        re.captures(text)
            .map(|caps| &caps[1] == "true")
            .unwrap_or(false)
    }

    fn parse_activity(&self, chunk: &[&str]) -> Option<ActivityRecord> {
        let header = chunk.first()?;
        let caps = self.re_activity.captures(header)?;
        let package_name = caps[1].to_string();
        let class_name = qualify(&package_name, &caps[2]);
        let pid = caps.get(3).and_then(|value| value.as_str().parse::<u32>().ok());

        let text = chunk.join("\n");
        let resumed = Self::flag(&self.re_resumed, &text);
        let stopped = Self::flag(&self.re_stopped, &text);
        let finished = Self::flag(&self.re_finished, &text);

        let raw_fragments = self.collect_fragments(chunk);
        debug!(
            activity = %class_name,
            fragments = raw_fragments.len(),
            "parsed activity chunk"
        );

        Some(ActivityRecord {
            class_name,
            package_name,
            pid,
            resumed,
            stopped,
            finished,
            state: ActivityState::derive(resumed, stopped, finished),
            level: 0,
            fragments: build_fragment_tree(raw_fragments),
        })
    }

    /// Fragments named in every `Added Fragments:` section of the chunk, in order of appearance,
    /// enriched from their detailed dump blocks.
    fn collect_fragments(&self, chunk: &[&str]) -> Vec<RawFragment> {
        let mut fragments: Vec<RawFragment> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        // Open fragment detail headers, innermost last: (indent, identity key).
        let mut open_headers: Vec<(usize, String)> = Vec::new();
        // Active `Added Fragments:` section: (indent, owning fragment key).
        let mut added_section: Option<(usize, Option<String>)> = None;
        // First detail header line of each fragment.
        let mut header_lines: HashMap<String, usize> = HashMap::new();

        for (index, line) in chunk.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let indent = indent_of(line);
            while open_headers
                .last()
                .map(|(open_indent, _)| *open_indent >= indent)
                .unwrap_or(false)
            {
                open_headers.pop();
            }
            if added_section
                .as_ref()
                .map(|(section_indent, _)| indent <= *section_indent)
                .unwrap_or(false)
            {
                added_section = None;
            }

            let trimmed = line.trim();
            if trimmed == "Added Fragments:" {
                let owner = open_headers.last().map(|(_, key)| key.clone());
                added_section = Some((indent, owner));
                continue;
            }

            if let Some((_, owner)) = &added_section {
                if let Some(caps) = self.re_added_entry.captures(line) {
                    let class_name = caps[1].to_string();
                    let instance_id = caps[2].to_string();
                    let key = identity_key(&class_name, &instance_id);
                    if seen.contains_key(&key) {
                        continue;
                    }
                    let tag = self
                        .re_entry_tag
                        .captures(&caps[3])
                        .and_then(|tag| non_null(&tag[1]));
                    seen.insert(key, fragments.len());
                    fragments.push(RawFragment {
                        class_name,
                        instance_id,
                        tag,
                        state: -1,
                        owner: owner.clone(),
                        ..RawFragment::default()
                    });
                }
                continue;
            }

            if let Some(caps) = self.re_fragment_header.captures(line) {
                let key = identity_key(&caps[1], &caps[2]);
                header_lines.entry(key.clone()).or_insert(index);
                open_headers.push((indent, key));
            }
        }

        for fragment in fragments.iter_mut() {
            if let Some(start) = header_lines.get(&fragment.key()) {
                let block = self.detail_block(chunk, *start);
                self.apply_detail(fragment, &block);
            }
        }
        fragments
    }

    /// Lines from the fragment's detail header through its `mView=` line. Stops early at the
    /// child manager, another fragment header, or an `Added Fragments:` section.
    fn detail_block(&self, chunk: &[&str], start: usize) -> String {
        let mut block = String::new();
        block.push_str(chunk[start]);
        for line in chunk.iter().skip(start + 1) {
            let trimmed = line.trim();
            if trimmed.starts_with("Child FragmentManager")
                || trimmed == "Added Fragments:"
                || self.re_fragment_header.is_match(line)
            {
                break;
            }
            block.push('\n');
            block.push_str(line);
            if trimmed.contains("mView=") {
                break;
            }
        }
        block
    }

    fn apply_detail(&self, fragment: &mut RawFragment, block: &str) {
        if let Some(tag) = self.re_tag.captures(block).and_then(|caps| non_null(&caps[1])) {
            fragment.tag = Some(tag);
        }
        fragment.state = self
            .re_state
            .captures(block)
            .and_then(|caps| caps[1].parse::<i32>().ok())
            .unwrap_or(-1);
        fragment.hidden = Self::flag(&self.re_hidden, block);
        fragment.user_visible_hint = Self::flag(&self.re_user_visible_hint, block);
        fragment.container = self
            .re_container
            .captures(block)
            .and_then(|caps| non_null(&caps[1]));
        fragment.who = self
            .re_who
            .captures(block)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        fragment.parent = self.re_parent.captures(block).and_then(|caps| {
            let class_name = non_null(&caps[1])?;
            Some((class_name, caps.get(2).map(|hash| hash.as_str().to_string())))
        });
    }
}

/// Index of each fragment's parent, or `None` for direct children of the activity.
///
/// `mParentFragment` is matched by class and identity hash when the hash is printed, otherwise
/// by class name alone (ambiguous when one class has several instances). Without it, the
/// fragment whose child manager listed this one is used. Cycles fall back to the activity.
fn resolve_parents(fragments: &[RawFragment]) -> Vec<Option<usize>> {
    let index_of_key: HashMap<String, usize> = fragments
        .iter()
        .enumerate()
        .map(|(index, fragment)| (fragment.key(), index))
        .collect();

    let mut parents: Vec<Option<usize>> = fragments
        .iter()
        .enumerate()
        .map(|(index, fragment)| {
            let explicit = fragment.parent.as_ref().and_then(|(class_name, hash)| {
                let by_identity = hash
                    .as_ref()
                    .and_then(|hash| index_of_key.get(&identity_key(class_name, hash)).copied());
                by_identity.or_else(|| {
                    fragments
                        .iter()
                        .enumerate()
                        .find(|(other, candidate)| {
                            *other != index && &candidate.class_name == class_name
                        })
                        .map(|(other, _)| other)
                })
            });
            explicit
                .or_else(|| {
                    fragment
                        .owner
                        .as_ref()
                        .and_then(|owner| index_of_key.get(owner).copied())
                })
                .filter(|parent| *parent != index)
        })
        .collect();

    for index in 0..parents.len() {
        let mut current = parents[index];
        let mut steps = 0usize;
        while let Some(node) = current {
            if node == index {
                parents[index] = None;
                break;
            }
            steps += 1;
            if steps > parents.len() {
                break;
            }
            current = parents[node];
        }
    }
    parents
}

fn build_fragment_tree(fragments: Vec<RawFragment>) -> Vec<FragmentInfo> {
    let parents = resolve_parents(&fragments);
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); fragments.len()];
    let mut roots = Vec::new();
    for (index, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(index),
            None => roots.push(index),
        }
    }

    fn build(index: usize, level: u32, fragments: &[RawFragment], children: &[Vec<usize>]) -> FragmentInfo {
        let raw = &fragments[index];
        FragmentInfo {
            class_name: raw.class_name.clone(),
            instance_id: raw.instance_id.clone(),
            tag: raw.tag.clone(),
            who: raw.who.clone(),
            state: raw.state,
            hidden: raw.hidden,
            user_visible_hint: raw.user_visible_hint,
            container: raw.container.clone(),
            level,
            children: children[index]
                .iter()
                .map(|child| build(*child, level + 1, fragments, children))
                .collect(),
        }
    }

    roots
        .into_iter()
        .map(|root| build(root, 1, &fragments, &children))
        .collect()
}
