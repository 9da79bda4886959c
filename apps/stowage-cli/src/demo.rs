//! Demo storable types: a team roster with shared members and mentor
//! cycles.

use std::collections::BTreeMap;
use stowage_common::StorableId;
use stowage_kernel::{
    Content, Result, Storable, StorableError, StorableRef, StorableType, Value, downcast_mut,
    register_type, shared,
};
use tracing::debug;

pub struct Team {
    pub id: StorableId,
    pub name: String,
    pub members: Vec<StorableRef>,
    pending: Vec<StorableId>,
}

pub struct Member {
    pub id: StorableId,
    pub name: String,
    pub skills: BTreeMap<String, i64>,
    pub mentor: Option<StorableRef>,
    pending_mentor: Option<StorableId>,
}

impl Storable for Team {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        Ok(Content::new()
            .with("name", self.name.as_str())
            .with("members", self.members.as_slice()))
    }

    fn link_storable(&mut self, id: &StorableId, object: StorableRef) -> Result<()> {
        if self.pending.get(self.members.len()) != Some(id) {
            return Err(StorableError::UnexpectedReference {
                owner: self.id.clone(),
                id: id.clone(),
            });
        }
        self.members.push(object);
        Ok(())
    }

    fn deserialize(&mut self) -> Result<()> {
        if self.members.len() != self.pending.len() {
            return Err(StorableError::Invalid {
                id: self.id.clone(),
                reason: format!(
                    "{} of {} members linked",
                    self.members.len(),
                    self.pending.len()
                ),
            });
        }
        Ok(())
    }
}

impl StorableType for Team {
    const TYPE_NAME: &'static str = "demo.Team";

    fn from_stored(id: StorableId, content: Content) -> Result<Self> {
        Ok(Self {
            id,
            name: content.str_field("name")?.to_owned(),
            members: Vec::new(),
            pending: content.reference_list("members")?,
        })
    }
}

impl Storable for Member {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn id(&self) -> &StorableId {
        &self.id
    }

    fn content(&self) -> Result<Content> {
        let skills: BTreeMap<String, Value> = self
            .skills
            .iter()
            .map(|(skill, level)| (skill.clone(), Value::from(*level)))
            .collect();
        let mut content = Content::new()
            .with("name", self.name.as_str())
            .with("skills", skills);
        if let Some(mentor) = &self.mentor {
            content.insert("mentor", mentor);
        }
        Ok(content)
    }

    fn link_storable(&mut self, id: &StorableId, object: StorableRef) -> Result<()> {
        if self.pending_mentor.as_ref() != Some(id) {
            return Err(StorableError::UnexpectedReference {
                owner: self.id.clone(),
                id: id.clone(),
            });
        }
        self.mentor = Some(object);
        Ok(())
    }
}

impl StorableType for Member {
    const TYPE_NAME: &'static str = "demo.Member";

    fn from_stored(id: StorableId, content: Content) -> Result<Self> {
        Ok(Self {
            id,
            name: content.str_field("name")?.to_owned(),
            skills: content.field("skills")?,
            mentor: None,
            pending_mentor: content.get("mentor").and_then(Value::as_reference).cloned(),
        })
    }
}

/// Register the demo types with the process-wide registry.
pub fn register() -> Result<()> {
    register_type::<Team>()?;
    register_type::<Member>()
}

fn member(name: &str, skills: &[(&str, i64)]) -> StorableRef {
    shared(Member {
        id: StorableId::generate(),
        name: name.to_owned(),
        skills: skills
            .iter()
            .map(|(skill, level)| ((*skill).to_owned(), *level))
            .collect(),
        mentor: None,
        pending_mentor: None,
    })
}

fn team(name: &str, members: &[&StorableRef]) -> StorableRef {
    shared(Team {
        id: StorableId::generate(),
        name: name.to_owned(),
        members: members.iter().map(|m| (*m).clone()).collect(),
        pending: Vec::new(),
    })
}

fn set_mentor(of: &StorableRef, mentor: &StorableRef) {
    if let Some(mut member) = downcast_mut::<Member>(of) {
        member.mentor = Some(mentor.clone());
    }
}

/// Two teams of `size` members each. The first member of each team is
/// shared with the other team, and mentors form a ring, so the graph has
/// both sharing and cycles.
pub fn build(size: usize) -> Vec<StorableRef> {
    let members: Vec<StorableRef> = (0..size.max(1) * 2)
        .map(|i| {
            member(
                &format!("member-{i}"),
                &[("rust", (i % 5) as i64 + 1), ("review", (i % 3) as i64)],
            )
        })
        .collect();
    for (i, m) in members.iter().enumerate() {
        set_mentor(m, &members[(i + 1) % members.len()]);
    }

    let (left, right) = members.split_at(members.len() / 2);
    let mut left_refs: Vec<&StorableRef> = left.iter().collect();
    let mut right_refs: Vec<&StorableRef> = right.iter().collect();
    left_refs.push(&right[0]);
    right_refs.push(&left[0]);
    debug!(members = members.len(), "built demo teams");
    vec![team("platform", &left_refs), team("tooling", &right_refs)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use stowage_kernel::downcast_ref;
    use stowage_persist::{PersistConfig, load_global, save};

    #[test]
    fn demo_graph_roundtrips() {
        register().unwrap();
        let roots = build(3);
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("teams.json");

        let summary = save(&path, &roots, &PersistConfig::default()).unwrap();
        assert_eq!(summary.objects, 8);

        let graph = load_global(&path).unwrap();
        let loaded = graph.root_objects();
        let platform = downcast_ref::<Team>(&loaded[0]).unwrap();
        let tooling = downcast_ref::<Team>(&loaded[1]).unwrap();
        assert_eq!(platform.name, "platform");
        assert_eq!(platform.members.len(), 4);
        assert!(Rc::ptr_eq(&platform.members[3], &tooling.members[0]));

        let first = downcast_ref::<Member>(&platform.members[0]).unwrap();
        assert_eq!(first.skills["rust"], 1);
        assert!(Rc::ptr_eq(first.mentor.as_ref().unwrap(), &platform.members[1]));
    }

    #[test]
    fn register_twice_is_fine() {
        register().unwrap();
        register().unwrap();
    }
}
