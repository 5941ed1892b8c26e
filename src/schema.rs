//! Declarative description of the entity graph returned by the game database API.

use indexmap::IndexMap;
use thiserror::Error;

/// Entity type holding games.
pub const GAMES: &str = "games";
/// Entity type holding reviews.
pub const REVIEWS: &str = "reviews";
/// Entity type holding user accounts.
pub const USERS: &str = "users";
/// Entity type holding persons (developers, composers, ...).
pub const PERSONS: &str = "persons";
/// Entity type holding user-curated collections.
pub const COLLECTIONS: &str = "collections";
/// Entity type holding platforms.
pub const PLATFORMS: &str = "platforms";
/// Entity type holding genres.
pub const GENRES: &str = "genres";
/// Entity type holding search suggestions.
pub const SUGGESTIONS: &str = "suggestions";

/// Composite schema for a list of games.
pub const GAME_LIST: &str = "game_list";
/// Composite schema for a list of reviews.
pub const REVIEW_LIST: &str = "review_list";
/// Composite schema for a list of collections.
pub const COLLECTION_LIST: &str = "collection_list";
/// Composite schema for a list of persons.
pub const PERSON_LIST: &str = "person_list";
/// Composite schema for a list of suggestions.
pub const SUGGESTION_LIST: &str = "suggestion_list";

const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Errors raised when the registry is asked for something it does not describe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No entity schema is registered under this name.
    #[error("unknown entity type `{0}`")]
    UnknownEntity(String),
    /// No composite schema is registered under this name.
    #[error("unknown composite schema `{0}`")]
    UnknownComposite(String),
    /// A relation points at an entity type missing from the registry.
    #[error("relation `{entity}.{field}` points at unknown entity type `{target}`")]
    DanglingRelation {
        /// Entity declaring the relation.
        entity: String,
        /// Field holding the relation.
        field: String,
        /// Missing target type.
        target: String,
    },
}

/// Shape expected at one position of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    /// A single entity of the named type (or its id once normalized).
    Entity(String),
    /// A sequence whose items all follow the inner node.
    Array(Box<SchemaNode>),
    /// A plain object where only the listed fields carry schemas.
    Object(IndexMap<String, SchemaNode>),
}

impl SchemaNode {
    /// Node referencing a single entity type.
    pub fn entity(name: impl Into<String>) -> Self {
        SchemaNode::Entity(name.into())
    }

    /// Node describing an array of `inner`.
    pub fn array_of(inner: SchemaNode) -> Self {
        SchemaNode::Array(Box::new(inner))
    }

    /// Node describing an object whose listed fields follow their own schemas.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, SchemaNode)>,
    {
        SchemaNode::Object(
            fields
                .into_iter()
                .map(|(field, node)| (field.into(), node))
                .collect(),
        )
    }

    /// Visit every entity type referenced by this node.
    fn referenced_entities<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SchemaNode::Entity(name) => out.push(name),
            SchemaNode::Array(inner) => inner.referenced_entities(out),
            SchemaNode::Object(fields) => {
                for node in fields.values() {
                    node.referenced_entities(out);
                }
            }
        }
    }
}

/// How a single entity type is identified and what it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Entity type name, also the key of its map in the entity store.
    pub key: String,
    /// Field holding the entity id.
    pub id_attribute: String,
    /// Referencing field name mapped to the schema of the referenced value.
    pub relations: IndexMap<String, SchemaNode>,
}

impl EntitySchema {
    /// Entity schema identified by `id` with no relations.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.into(),
            relations: IndexMap::new(),
        }
    }

    /// Override the id field name.
    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    /// Declare that `field` holds a value following `node`.
    pub fn relation(mut self, field: impl Into<String>, node: SchemaNode) -> Self {
        self.relations.insert(field.into(), node);
        self
    }
}

/// Read-only lookup of entity schemas and named composite schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRegistry {
    entities: IndexMap<String, EntitySchema>,
    composites: IndexMap<String, SchemaNode>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry describing the game database API.
    pub fn game_database() -> Self {
        let game = SchemaNode::entity(GAMES);
        let review = SchemaNode::entity(REVIEWS);
        let user = SchemaNode::entity(USERS);
        let person = SchemaNode::entity(PERSONS);
        let platform = SchemaNode::entity(PLATFORMS);
        let genre = SchemaNode::entity(GENRES);

        Self::new()
            .with_entity(
                EntitySchema::new(GAMES)
                    .relation("reviews", SchemaNode::array_of(review.clone()))
                    .relation("platforms", SchemaNode::array_of(platform.clone()))
                    .relation("genres", SchemaNode::array_of(genre.clone()))
                    .relation("developers", SchemaNode::array_of(person.clone())),
            )
            .with_entity(EntitySchema::new(REVIEWS).relation("user", user.clone()))
            .with_entity(EntitySchema::new(USERS))
            .with_entity(
                EntitySchema::new(PERSONS).relation("games", SchemaNode::array_of(game.clone())),
            )
            .with_entity(
                EntitySchema::new(COLLECTIONS)
                    .with_id_attribute("slug")
                    .relation("creator", user)
                    .relation("games", SchemaNode::array_of(game.clone())),
            )
            .with_entity(EntitySchema::new(PLATFORMS))
            .with_entity(EntitySchema::new(GENRES))
            .with_entity(
                EntitySchema::new(SUGGESTIONS)
                    .relation("games", SchemaNode::array_of(game.clone())),
            )
            .with_composite(GAME_LIST, SchemaNode::array_of(game))
            .with_composite(REVIEW_LIST, SchemaNode::array_of(review))
            .with_composite(PERSON_LIST, SchemaNode::array_of(person))
            .with_composite(
                COLLECTION_LIST,
                SchemaNode::array_of(SchemaNode::entity(COLLECTIONS)),
            )
            .with_composite(
                SUGGESTION_LIST,
                SchemaNode::array_of(SchemaNode::entity(SUGGESTIONS)),
            )
    }

    /// Register (or replace) an entity schema.
    pub fn with_entity(mut self, schema: EntitySchema) -> Self {
        self.entities.insert(schema.key.clone(), schema);
        self
    }

    /// Register (or replace) a named composite schema.
    pub fn with_composite(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        self.composites.insert(name.into(), node);
        self
    }

    /// Look up the schema of an entity type.
    pub fn entity(&self, name: &str) -> Result<&EntitySchema, SchemaError> {
        self.entities
            .get(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.into()))
    }

    /// Look up a named composite schema.
    pub fn composite(&self, name: &str) -> Result<&SchemaNode, SchemaError> {
        self.composites
            .get(name)
            .ok_or_else(|| SchemaError::UnknownComposite(name.into()))
    }

    /// Check that every relation and composite targets a registered entity type.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for schema in self.entities.values() {
            for (field, node) in &schema.relations {
                let mut targets = Vec::new();
                node.referenced_entities(&mut targets);
                let dangling = targets
                    .into_iter()
                    .find(|target| !self.entities.contains_key(*target));
                if let Some(target) = dangling {
                    return Err(SchemaError::DanglingRelation {
                        entity: schema.key.clone(),
                        field: field.clone(),
                        target: target.into(),
                    });
                }
            }
        }

        for node in self.composites.values() {
            let mut targets = Vec::new();
            node.referenced_entities(&mut targets);
            let dangling = targets
                .into_iter()
                .find(|target| !self.entities.contains_key(*target));
            if let Some(target) = dangling {
                return Err(SchemaError::UnknownEntity(target.into()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_database_registry_is_consistent() {
        let registry = SchemaRegistry::game_database();
        assert!(registry.validate().is_ok());
        assert_eq!(registry.entity(GAMES).unwrap().id_attribute, "id");
        assert_eq!(registry.entity(COLLECTIONS).unwrap().id_attribute, "slug");
        assert_eq!(
            registry.composite(GAME_LIST).unwrap(),
            &SchemaNode::array_of(SchemaNode::entity(GAMES))
        );
    }

    #[test]
    fn unknown_lookups_are_errors() {
        let registry = SchemaRegistry::game_database();
        assert_eq!(
            registry.entity("consoles").unwrap_err(),
            SchemaError::UnknownEntity("consoles".into())
        );
        assert_eq!(
            registry.composite("console_list").unwrap_err(),
            SchemaError::UnknownComposite("console_list".into())
        );
    }

    #[test]
    fn dangling_relation_is_reported() {
        let registry = SchemaRegistry::new().with_entity(
            EntitySchema::new(GAMES).relation("studio", SchemaNode::entity("studios")),
        );

        match registry.validate().unwrap_err() {
            SchemaError::DanglingRelation {
                entity,
                field,
                target,
            } => {
                assert_eq!(entity, GAMES);
                assert_eq!(field, "studio");
                assert_eq!(target, "studios");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
