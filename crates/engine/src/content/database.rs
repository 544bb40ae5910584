use std::collections::HashMap;

use crate::movement::ActorProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorDefId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct ActorDef {
    pub id: ActorDefId,
    pub def_name: String,
    pub label: String,
    pub profile: ActorProfile,
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ActorDefDatabase {
    defs: Vec<ActorDef>,
    ids_by_name: HashMap<String, ActorDefId>,
}

impl ActorDefDatabase {
    pub(crate) fn from_defs(mut defs: Vec<ActorDef>) -> Self {
        let mut ids_by_name = HashMap::with_capacity(defs.len());
        for (idx, def) in defs.iter_mut().enumerate() {
            let id = ActorDefId(idx as u32);
            def.id = id;
            ids_by_name.insert(def.def_name.clone(), id);
        }
        Self { defs, ids_by_name }
    }

    pub fn id_by_name(&self, name: &str) -> Option<ActorDefId> {
        self.ids_by_name.get(name).copied()
    }

    pub fn def(&self, id: ActorDefId) -> Option<&ActorDef> {
        self.defs.get(id.0 as usize)
    }

    pub fn def_by_name(&self, name: &str) -> Option<&ActorDef> {
        self.id_by_name(name).and_then(|id| self.def(id))
    }

    pub fn defs(&self) -> &[ActorDef] {
        &self.defs
    }
}
