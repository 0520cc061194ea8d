//! Item values and the pluggable factories that own their lifecycle.
//!
//! Every concrete item type a query can work with (floats, positions, entity
//! handles, ...) is represented by one [`ItemFactory`]. Factories create,
//! destroy, clone and (optionally) serialize items; everything else in the
//! crate treats item values as opaque [`Item`]s.

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::registry::Registered;

/// Identity of an item type. Two types are the same iff their `TypeId`s match.
#[derive(Clone, Copy)]
pub struct ItemTypeInfo {
    id: TypeId,
    name: &'static str,
}

impl ItemTypeInfo {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ItemTypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ItemTypeInfo {}

impl fmt::Debug for ItemTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ItemTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased item value.
pub struct Item(Box<dyn Any + Send + Sync>);

impl Item {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// `TypeId` of the contained value.
    pub fn value_type_id(&self) -> TypeId {
        (*self.0).type_id()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut::<T>()
    }

    pub fn downcast<T: Any>(self) -> Result<T, Item> {
        self.0.downcast::<T>().map(|boxed| *boxed).map_err(Item)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Item(..)")
    }
}

/// Capability set of one concrete item type.
///
/// Items handed out by `create_items` must be given back to the same
/// factory's `destroy_items` exactly once.
pub trait ItemFactory: Registered + Send + Sync {
    fn item_type(&self) -> ItemTypeInfo;

    /// Create `count` default-initialized items.
    fn create_items(&self, count: usize) -> Vec<Item>;

    fn destroy_items(&self, items: Vec<Item>);

    /// Deep copy of an item of this factory's type. `None` on type mismatch.
    fn clone_item(&self, item: &Item) -> Option<Item>;

    /// Whether items of this type can be written to and read from a literal string.
    fn can_be_persistently_serialized(&self) -> bool;

    fn serialize_item(&self, item: &Item) -> Option<String>;

    fn deserialize_item(&self, item: &mut Item, literal: &str) -> Result<(), String>;
}

/// Parse `literal` into `item` through `factory`.
pub fn deserialize_item_from_literal(
    item: &mut Item,
    factory: &dyn ItemFactory,
    literal: &str,
) -> Result<(), String> {
    if !factory.can_be_persistently_serialized() {
        return Err(format!(
            "item type '{}' cannot be serialized",
            factory.name()
        ));
    }
    factory.deserialize_item(item, literal)
}

/// Render `item` as a literal string through `factory`.
pub fn serialize_item_to_literal(item: &Item, factory: &dyn ItemFactory) -> Option<String> {
    if !factory.can_be_persistently_serialized() {
        return None;
    }
    factory.serialize_item(item)
}

/// Returns true if both handles point at the same factory object.
pub fn same_item_factory(a: &Arc<dyn ItemFactory>, b: &Arc<dyn ItemFactory>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct LiteralCodec<T> {
    to_literal: fn(&T) -> String,
    from_literal: fn(&str) -> Result<T, String>,
}

/// Stock [`ItemFactory`] for any `Default + Clone` Rust type.
pub struct TypedItemFactory<T> {
    name: String,
    guid: Uuid,
    codec: Option<LiteralCodec<T>>,
}

impl<T> TypedItemFactory<T>
where
    T: Default + Clone + Send + Sync + 'static,
{
    /// A factory for a type with no literal representation.
    pub fn new(name: &str, guid: Uuid) -> Self {
        Self {
            name: name.to_string(),
            guid,
            codec: None,
        }
    }

    /// A factory with explicit literal conversion functions.
    pub fn with_codec(
        name: &str,
        guid: Uuid,
        to_literal: fn(&T) -> String,
        from_literal: fn(&str) -> Result<T, String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            guid,
            codec: Some(LiteralCodec {
                to_literal,
                from_literal,
            }),
        }
    }
}

impl<T> TypedItemFactory<T>
where
    T: Default + Clone + Send + Sync + 'static + FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    /// A factory whose literals go through `FromStr` / `Display`.
    pub fn with_literal(name: &str, guid: Uuid) -> Self {
        Self::with_codec(
            name,
            guid,
            |value| value.to_string(),
            |literal| literal.parse::<T>().map_err(|e| e.to_string()),
        )
    }
}

impl<T> Registered for TypedItemFactory<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn guid(&self) -> Uuid {
        self.guid
    }
}

impl<T> ItemFactory for TypedItemFactory<T>
where
    T: Default + Clone + Send + Sync + 'static,
{
    fn item_type(&self) -> ItemTypeInfo {
        ItemTypeInfo::of::<T>()
    }

    fn create_items(&self, count: usize) -> Vec<Item> {
        (0..count).map(|_| Item::new(T::default())).collect()
    }

    fn destroy_items(&self, items: Vec<Item>) {
        drop(items);
    }

    fn clone_item(&self, item: &Item) -> Option<Item> {
        item.downcast_ref::<T>().map(|value| Item::new(value.clone()))
    }

    fn can_be_persistently_serialized(&self) -> bool {
        self.codec.is_some()
    }

    fn serialize_item(&self, item: &Item) -> Option<String> {
        let codec = self.codec.as_ref()?;
        item.downcast_ref::<T>().map(codec.to_literal)
    }

    fn deserialize_item(&self, item: &mut Item, literal: &str) -> Result<(), String> {
        let codec = self
            .codec
            .as_ref()
            .ok_or_else(|| format!("item type '{}' has no literal form", self.name))?;
        let slot = item
            .downcast_mut::<T>()
            .ok_or_else(|| format!("item is not of type '{}'", self.name))?;
        *slot = (codec.from_literal)(literal)?;
        Ok(())
    }
}

/// One item together with the factory that created it. Dropping it hands the
/// item back to that factory.
pub struct OwnedItem {
    factory: Arc<dyn ItemFactory>,
    // Always exactly one element until dropped.
    items: Vec<Item>,
}

impl OwnedItem {
    /// Create one default item. `None` if the factory produced nothing.
    pub fn create(factory: Arc<dyn ItemFactory>) -> Option<Self> {
        let items = factory.create_items(1);
        if items.len() != 1 {
            factory.destroy_items(items);
            return None;
        }
        Some(Self { factory, items })
    }

    /// Create one item and overwrite it with `value`.
    pub fn with_value<T: Any>(factory: Arc<dyn ItemFactory>, value: T) -> Option<Self> {
        let mut owned = Self::create(factory)?;
        *owned.item_mut().downcast_mut::<T>()? = value;
        Some(owned)
    }

    pub fn factory(&self) -> &Arc<dyn ItemFactory> {
        &self.factory
    }

    pub fn item(&self) -> &Item {
        &self.items[0]
    }

    pub fn item_mut(&mut self) -> &mut Item {
        &mut self.items[0]
    }

    pub fn to_literal(&self) -> Option<String> {
        serialize_item_to_literal(self.item(), self.factory.as_ref())
    }
}

impl Drop for OwnedItem {
    fn drop(&mut self) {
        let items = std::mem::take(&mut self.items);
        if !items.is_empty() {
            self.factory.destroy_items(items);
        }
    }
}

impl fmt::Debug for OwnedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedItem")
            .field("factory", &self.factory.name())
            .field("value", &self.to_literal())
            .finish()
    }
}

/// A homogeneous list of items, e.g. the output of a generator or the items
/// shuttled into a nested query.
#[derive(Debug)]
pub struct ItemList {
    item_type: ItemTypeInfo,
    items: Vec<Item>,
}

impl ItemList {
    pub fn new(item_type: ItemTypeInfo) -> Self {
        Self {
            item_type,
            items: Vec::new(),
        }
    }

    pub fn item_type(&self) -> ItemTypeInfo {
        self.item_type
    }

    /// Append a value. Returns false (and drops nothing) on type mismatch.
    pub fn push<T: Any + Send + Sync>(&mut self, value: T) -> bool {
        if TypeId::of::<T>() != self.item_type.id() {
            return false;
        }
        self.items.push(Item::new(value));
        true
    }

    pub fn push_item(&mut self, item: Item) -> Result<(), Item> {
        if item.value_type_id() != self.item_type.id() {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.downcast_ref::<T>()
    }

    pub fn get_item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Deep copy through `factory`. `None` if any element fails to clone.
    pub fn clone_with(&self, factory: &dyn ItemFactory) -> Option<ItemList> {
        let items = self
            .items
            .iter()
            .map(|item| factory.clone_item(item))
            .collect::<Option<Vec<_>>>()?;
        Some(ItemList {
            item_type: self.item_type,
            items,
        })
    }
}

/// A borrowed item together with the factory describing its type.
#[derive(Clone)]
pub struct VariantEntry<'a> {
    pub factory: Arc<dyn ItemFactory>,
    pub item: &'a Item,
}

impl fmt::Debug for VariantEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantEntry")
            .field("factory", &self.factory.name())
            .finish()
    }
}

/// Name to item dictionary. Items are borrowed, never owned.
#[derive(Debug, Clone, Default)]
pub struct VariantDict<'a> {
    entries: FxHashMap<String, VariantEntry<'a>>,
}

impl<'a> VariantDict<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `name`.
    pub fn add_or_replace(&mut self, name: &str, factory: Arc<dyn ItemFactory>, item: &'a Item) {
        self.entries
            .insert(name.to_string(), VariantEntry { factory, item });
    }

    pub fn find(&self, name: &str) -> Option<&VariantEntry<'a>> {
        self.entries.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Typed read access.
    pub fn get<T: Any>(&self, name: &str) -> Option<&'a T> {
        self.entries.get(name)?.item.downcast_ref::<T>()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariantEntry<'a>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
