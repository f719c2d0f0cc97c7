//! Document
//! The single owner of a graph, its symbol table and its user-edited code.
//!
//! The editor drives everything through a document: graph edits, regeneration
//! with edit preservation, code edits per range, and offset lookups. The
//! symbol table is shared with trace decoders through a lock, and generation
//! holds the write lock for the whole pass.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

use crate::codegen::{generate_code, CodegenError, GeneratorOptions, Key, StateMachinePolicy};
use crate::fsm::{ActionId, ConditionId, Entity, Graph};
use crate::reconcile::{DiscardedEdit, Reconciler};
use crate::symbols::{SharedSymbolTable, SymbolTable};
use crate::template::{TemplateBuffer, TemplateError};


#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Code generation failed: {0}")]
    Codegen(#[from] CodegenError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Invalid document file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

pub struct Document {
    graph: Graph,
    symbols: SharedSymbolTable,
    options: GeneratorOptions,
    template: Option<TemplateBuffer<Key>>,
}

#[derive(Serialize, Deserialize)]
struct DocumentFile {
    graph: Graph,
    symbols: SymbolTable,
    options: GeneratorOptions,
    template: Option<TemplateBuffer<Key>>,
}

impl Document {
    pub fn new(graph: Graph, options: GeneratorOptions) -> Self {
        Self {
            graph,
            symbols: SymbolTable::new().shared(),
            options,
            template: None,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Edit the graph. Call [`Document::update_code`] afterwards.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Handle for trace decoders
    pub fn symbols(&self) -> SharedSymbolTable {
        self.symbols.clone()
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub fn template(&self) -> Option<&TemplateBuffer<Key>> {
        self.template.as_ref()
    }

    fn generate(&self, options: &GeneratorOptions) -> DocumentResult<TemplateBuffer<Key>> {
        let mut symbols = self.symbols.write();
        Ok(generate_code(&self.graph, &mut symbols, options)?)
    }

    /// Carry the current template's edits into `fresh`
    fn merge_into(
        &self,
        fresh: TemplateBuffer<Key>,
    ) -> DocumentResult<(TemplateBuffer<Key>, Vec<DiscardedEdit<Key>>)> {
        match &self.template {
            Some(old) => {
                let reconciler = Reconciler::new(StateMachinePolicy::new(&self.graph));
                let result = reconciler.reconcile(old, fresh)?;
                Ok((result.buffer, result.discarded))
            }
            None => Ok((fresh, Vec::new())),
        }
    }

    /// Regenerate after graph edits, keeping user code where it still has a home.
    /// Returns the ranges whose text was dropped.
    pub fn update_code(&mut self) -> DocumentResult<Vec<DiscardedEdit<Key>>> {
        let fresh = self.generate(&self.options)?;
        let (template, discarded) = self.merge_into(fresh)?;
        self.template = Some(template);
        Ok(discarded)
    }

    /// What [`Document::update_code`] would discard, without committing anything
    /// but symbol ids. Only ranges holding user edits are reported.
    pub fn preview_discards(&self) -> DocumentResult<Vec<DiscardedEdit<Key>>> {
        let fresh = self.generate(&self.options)?;
        let (_, discarded) = self.merge_into(fresh)?;
        Ok(discarded.into_iter().filter(|d| d.edited).collect())
    }

    /// Current code, generating it first if needed
    pub fn code(&mut self) -> DocumentResult<&str> {
        if self.template.is_none() {
            self.update_code()?;
        }
        Ok(self.template.as_ref().map_or("", |t| t.code()))
    }

    /// The current code with trace instrumentation, for uploading in a live session
    pub fn code_with_logging(&mut self) -> DocumentResult<String> {
        if self.template.is_none() {
            self.update_code()?;
        }
        let options = self.options.clone().with_logging(true);
        let fresh = self.generate(&options)?;
        let (template, discarded) = self.merge_into(fresh)?;
        if !discarded.is_empty() {
            log::warn!("{} ranges did not carry over into the logging build", discarded.len());
        }
        Ok(template.code().to_string())
    }

    pub fn code_for(&self, key: &Key) -> Option<&str> {
        self.template.as_ref()?.code_for_key(key)
    }

    /// Accept edited text for one range
    pub fn set_code(&mut self, key: &Key, code: &str) -> DocumentResult<()> {
        let template = self
            .template
            .as_mut()
            .ok_or_else(|| TemplateError::UnknownKey(format!("{:?}", key)))?;
        template.set_code(key, code)?;
        Ok(())
    }

    pub fn range_for_condition(&self, id: ConditionId) -> Option<Range<usize>> {
        self.template.as_ref()?.range_for_key(&Key::Condition(id))
    }

    pub fn range_for_action(&self, id: ActionId) -> Option<Range<usize>> {
        self.template.as_ref()?.range_for_key(&Key::Action(id))
    }

    /// Innermost graph entity whose code covers `offset`
    pub fn entity_at(&self, offset: usize) -> Option<Entity> {
        let template = self.template.as_ref()?;
        template
            .extra_keys_at(offset)
            .into_iter()
            .find_map(|key| key.entity())
            .or_else(|| {
                template
                    .editable_key_at(offset)
                    .and_then(|key| key.entity())
            })
    }

    /// Editable range keys in code order, for next/previous navigation
    pub fn editable_keys(&self) -> Vec<Key> {
        self.template
            .as_ref()
            .map(|t| t.keys_in_order().copied().collect())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> DocumentResult<String> {
        let file = DocumentFile {
            graph: self.graph.clone(),
            symbols: self.symbols.read().clone(),
            options: self.options.clone(),
            template: self.template.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn from_json(json: &str) -> DocumentResult<Self> {
        let file: DocumentFile = serde_json::from_str(json)?;
        Ok(Self {
            graph: file.graph,
            symbols: file.symbols.shared(),
            options: file.options,
            template: file.template,
        })
    }
}
