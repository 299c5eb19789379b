//! The target repository: the records the engine creates and maintains.
//!
//! Only identity and content matter to the sync engine. Deletes remove
//! dependents first (an element's children, a model's elements) and are
//! idempotent: deleting an id that is already gone is a no-op.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::ids::TargetId;
use crate::error::Result;

/// A model as produced by a transcoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetModel {
    pub name: String,
    pub kind: String,
    pub properties: serde_json::Value,
}

/// An element as produced by a transcoder, with its owned children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetElement {
    pub class_name: String,
    pub properties: serde_json::Value,
    pub children: Vec<TargetElement>,
}

/// A view as produced by a transcoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetView {
    pub name: String,
    pub properties: serde_json::Value,
}

/// A stored element row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementRow {
    pub id: TargetId,
    pub model: TargetId,
    pub parent: Option<TargetId>,
    pub class_name: String,
    pub properties: serde_json::Value,
}

/// Read/write access to the `target_*` tables.
pub struct TargetRepo<'c> {
    conn: &'c Connection,
}

impl<'c> TargetRepo<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ==================
    // Models
    // ==================

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_model(&self, model: &TargetModel) -> Result<TargetId> {
        self.conn.execute(
            "INSERT INTO target_models (name, kind, properties) VALUES (?1, ?2, ?3)",
            params![model.name, model.kind, serde_json::to_string(&model.properties)?],
        )?;
        Ok(TargetId(self.conn.last_insert_rowid()))
    }

    /// Returns `false` if the model no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_model(&self, id: TargetId, model: &TargetModel) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE target_models SET name = ?2, kind = ?3, properties = ?4 WHERE id = ?1",
            params![id, model.name, model.kind, serde_json::to_string(&model.properties)?],
        )?;
        Ok(changed > 0)
    }

    /// Delete a model after its contained elements.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn delete_model(&self, id: TargetId) -> Result<usize> {
        let roots: Vec<TargetId> = self
            .conn
            .prepare("SELECT id FROM target_elements WHERE model_id = ?1 AND parent_id IS NULL")?
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut removed = 0;
        for root in roots {
            removed += self.delete_element(root)?;
        }
        removed += self
            .conn
            .execute("DELETE FROM target_models WHERE id = ?1", [id])?;
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn model_exists(&self, id: TargetId) -> Result<bool> {
        Ok(self
            .conn
            .prepare("SELECT 1 FROM target_models WHERE id = ?1")?
            .exists([id])?)
    }

    // ==================
    // Elements
    // ==================

    /// Insert an element and its children.
    ///
    /// # Errors
    ///
    /// Returns an error if an insert fails (for example, the model is gone).
    pub fn insert_element(
        &self,
        model: TargetId,
        parent: Option<TargetId>,
        element: &TargetElement,
    ) -> Result<TargetId> {
        self.conn.execute(
            "INSERT INTO target_elements (model_id, parent_id, class_name, properties)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                model,
                parent,
                element.class_name,
                serde_json::to_string(&element.properties)?
            ],
        )?;
        let id = TargetId(self.conn.last_insert_rowid());
        for child in &element.children {
            self.insert_element(model, Some(id), child)?;
        }
        Ok(id)
    }

    /// Replace an element's content and children, keeping its id.
    ///
    /// Returns `false` if the element no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub fn update_element(
        &self,
        id: TargetId,
        model: TargetId,
        element: &TargetElement,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE target_elements SET model_id = ?2, class_name = ?3, properties = ?4 WHERE id = ?1",
            params![
                id,
                model,
                element.class_name,
                serde_json::to_string(&element.properties)?
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        for child in self.children_of(id)? {
            self.delete_element(child)?;
        }
        for child in &element.children {
            self.insert_element(model, Some(id), child)?;
        }
        Ok(true)
    }

    /// Delete an element after its children.
    ///
    /// Returns the number of rows removed; zero if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub fn delete_element(&self, id: TargetId) -> Result<usize> {
        let mut removed = 0;
        for child in self.children_of(id)? {
            removed += self.delete_element(child)?;
        }
        removed += self
            .conn
            .execute("DELETE FROM target_elements WHERE id = ?1", [id])?;
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn children_of(&self, id: TargetId) -> Result<Vec<TargetId>> {
        let children = self
            .conn
            .prepare("SELECT id FROM target_elements WHERE parent_id = ?1 ORDER BY id")?
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(children)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_element(&self, id: TargetId) -> Result<Option<ElementRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, model_id, parent_id, class_name, properties FROM target_elements WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, TargetId>(0)?,
                        row.get::<_, TargetId>(1)?,
                        row.get::<_, Option<TargetId>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, model, parent, class_name, properties)) => Ok(Some(ElementRow {
                id,
                model,
                parent,
                class_name,
                properties: serde_json::from_str(&properties)?,
            })),
            None => Ok(None),
        }
    }

    // ==================
    // Views
    // ==================

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_view(&self, view: &TargetView) -> Result<TargetId> {
        self.conn.execute(
            "INSERT INTO target_views (name, properties) VALUES (?1, ?2)",
            params![view.name, serde_json::to_string(&view.properties)?],
        )?;
        Ok(TargetId(self.conn.last_insert_rowid()))
    }

    /// Returns `false` if the view no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_view(&self, id: TargetId, view: &TargetView) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE target_views SET name = ?2, properties = ?3 WHERE id = ?1",
            params![id, view.name, serde_json::to_string(&view.properties)?],
        )?;
        Ok(changed > 0)
    }

    /// Returns the number of rows removed; zero if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_view(&self, id: TargetId) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM target_views WHERE id = ?1", [id])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SyncStore;
    use serde_json::json;

    fn model() -> TargetModel {
        TargetModel {
            name: "Default".to_string(),
            kind: "spatial".to_string(),
            properties: json!({}),
        }
    }

    fn leaf(class: &str) -> TargetElement {
        TargetElement {
            class_name: class.to_string(),
            properties: json!({"class": class}),
            children: Vec::new(),
        }
    }

    fn assembly() -> TargetElement {
        TargetElement {
            class_name: "Assembly".to_string(),
            properties: json!({}),
            children: vec![
                TargetElement {
                    children: vec![leaf("Bolt")],
                    ..leaf("Plate")
                },
                leaf("Nut"),
            ],
        }
    }

    #[test]
    fn test_insert_element_tree() {
        let store = SyncStore::open_memory().unwrap();
        let repo = TargetRepo::new(store.conn());
        let model_id = repo.insert_model(&model()).unwrap();

        let root = repo.insert_element(model_id, None, &assembly()).unwrap();
        let children = repo.children_of(root).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(store.counts().unwrap().target_elements, 4);

        let row = repo.get_element(children[0]).unwrap().unwrap();
        assert_eq!(row.parent, Some(root));
        assert_eq!(row.class_name, "Plate");
    }

    #[test]
    fn test_delete_element_cascades_and_is_idempotent() {
        let store = SyncStore::open_memory().unwrap();
        let repo = TargetRepo::new(store.conn());
        let model_id = repo.insert_model(&model()).unwrap();
        let root = repo.insert_element(model_id, None, &assembly()).unwrap();

        assert_eq!(repo.delete_element(root).unwrap(), 4);
        assert_eq!(repo.delete_element(root).unwrap(), 0);
        assert_eq!(store.counts().unwrap().target_elements, 0);
    }

    #[test]
    fn test_delete_model_removes_elements_first() {
        let store = SyncStore::open_memory().unwrap();
        let repo = TargetRepo::new(store.conn());
        let model_id = repo.insert_model(&model()).unwrap();
        repo.insert_element(model_id, None, &assembly()).unwrap();
        repo.insert_element(model_id, None, &leaf("Wall")).unwrap();

        assert_eq!(repo.delete_model(model_id).unwrap(), 6);
        assert!(!repo.model_exists(model_id).unwrap());
        assert_eq!(repo.delete_model(model_id).unwrap(), 0);
    }

    #[test]
    fn test_update_element_replaces_children() {
        let store = SyncStore::open_memory().unwrap();
        let repo = TargetRepo::new(store.conn());
        let model_id = repo.insert_model(&model()).unwrap();
        let root = repo.insert_element(model_id, None, &assembly()).unwrap();

        let replacement = TargetElement {
            children: vec![leaf("Washer")],
            ..leaf("Assembly")
        };
        assert!(repo.update_element(root, model_id, &replacement).unwrap());
        assert_eq!(repo.children_of(root).unwrap().len(), 1);
        assert_eq!(store.counts().unwrap().target_elements, 2);

        assert!(!repo
            .update_element(TargetId(999), model_id, &replacement)
            .unwrap());
    }

    #[test]
    fn test_views() {
        let store = SyncStore::open_memory().unwrap();
        let repo = TargetRepo::new(store.conn());
        let view = TargetView {
            name: "Top".to_string(),
            properties: json!({"rotation": [1, 0, 0]}),
        };

        let id = repo.insert_view(&view).unwrap();
        assert!(repo.update_view(id, &view).unwrap());
        assert_eq!(repo.delete_view(id).unwrap(), 1);
        assert_eq!(repo.delete_view(id).unwrap(), 0);
        assert!(!repo.update_view(id, &view).unwrap());
    }
}
