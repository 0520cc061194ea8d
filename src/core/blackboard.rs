//! Run-time data a function call hierarchy executes against.

use crate::schema::item::{ItemList, VariantDict};

/// Everything a function may read while executing. Nothing here is owned;
/// the caller keeps the items alive for the duration of the run.
#[derive(Debug, Default)]
pub struct Blackboard<'a> {
    /// Constant and runtime parameters, by name.
    pub global_params: VariantDict<'a>,
    /// Items handed in from an enclosing query.
    pub shuttled_items: Option<&'a ItemList>,
    /// Items currently being evaluated.
    pub iterated_items: Option<&'a ItemList>,
}

impl<'a> Blackboard<'a> {
    pub fn new(global_params: VariantDict<'a>) -> Self {
        Self {
            global_params,
            shuttled_items: None,
            iterated_items: None,
        }
    }

    pub fn with_shuttled_items(mut self, items: &'a ItemList) -> Self {
        self.shuttled_items = Some(items);
        self
    }

    pub fn with_iterated_items(mut self, items: &'a ItemList) -> Self {
        self.iterated_items = Some(items);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecuteContext<'a> {
    pub blackboard: &'a Blackboard<'a>,
    /// Index into `blackboard.iterated_items`.
    pub current_item_index: usize,
}

impl<'a> ExecuteContext<'a> {
    pub fn new(blackboard: &'a Blackboard<'a>, current_item_index: usize) -> Self {
        Self {
            blackboard,
            current_item_index,
        }
    }
}
