use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::error::{Error, Result};
use crate::hash::FastIndexMap;
use crate::observable::Source;
use crate::observable::binding::{current_observer, untracked};
use crate::value::Value;

type ChangedCallback = Rc<dyn Fn(&Observable, &Value, &Value)>;

/// Declaration of one reactive property.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: Rc<str>,
    default: Value,
    changed: Option<ChangedCallback>,
}

impl PropertyDescriptor {
    /// A property named `name` that starts out as Null.
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            default: Value::Null,
            changed: None,
        }
    }

    /// Initial value for new objects.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Callback run after a write changed the value, before subscribers hear about it.
    ///
    /// Receives the object, the old value and the new value.
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Observable, &Value, &Value) + 'static,
    {
        self.changed = Some(Rc::new(callback));
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("changed", &self.changed.is_some())
            .finish()
    }
}

struct TypeInfo {
    name: Rc<str>,
    properties: FastIndexMap<Rc<str>, PropertyDescriptor>,
}

/// A registered type: an ordered table of reactive properties.
///
/// The table is built once, at registration, from the base type's table
/// followed by the properties declared on this type.
#[derive(Clone)]
pub struct ObservableType(Rc<TypeInfo>);

impl ObservableType {
    /// Start declaring a type called `name`.
    pub fn builder(name: &str) -> TypeBuilder {
        TypeBuilder {
            name: Rc::from(name),
            base: None,
            declared: Vec::new(),
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Every reactive property in table order, base properties first.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.0.properties.values()
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.0.properties.get(name)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObservableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableType")
            .field("name", &self.0.name)
            .field("properties", &self.0.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder returned by [`ObservableType::builder`].
pub struct TypeBuilder {
    name: Rc<str>,
    base: Option<ObservableType>,
    declared: Vec<PropertyDescriptor>,
}

impl TypeBuilder {
    /// Inherit every property of `base`, ahead of this type's own.
    pub fn extends(mut self, base: &ObservableType) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Declare a property that starts out as Null.
    pub fn property(self, name: &str) -> Self {
        self.descriptor(PropertyDescriptor::new(name))
    }

    /// Declare a property from a full descriptor.
    pub fn descriptor(mut self, descriptor: PropertyDescriptor) -> Self {
        self.declared.push(descriptor);
        self
    }

    /// Freeze the property table.
    pub fn build(self) -> Result<ObservableType> {
        let mut properties = self
            .base
            .map(|base| base.0.properties.clone())
            .unwrap_or_default();
        for descriptor in self.declared {
            if properties.contains_key(&descriptor.name) {
                return Err(Error::DuplicateProperty {
                    type_name: self.name.to_string(),
                    property: descriptor.name.to_string(),
                });
            }
            properties.insert(descriptor.name.clone(), descriptor);
        }
        Ok(ObservableType(Rc::new(TypeInfo {
            name: self.name,
            properties,
        })))
    }
}

struct ObjectInner {
    ty: ObservableType,
    values: RefCell<Vec<Value>>,
    source: Source,
}

/// An instance of an [`ObservableType`].
///
/// Reads of declared properties are tracked by the active binding observer;
/// writes that change a value run the property's change callback and notify
/// subscribers. Cloning shares the instance.
#[derive(Clone)]
pub struct Observable(Rc<ObjectInner>);

/// Non-owning handle to an [`Observable`].
#[derive(Clone)]
pub(crate) struct WeakObservable(Weak<ObjectInner>);

impl WeakObservable {
    pub(crate) fn upgrade(&self) -> Option<Observable> {
        self.0.upgrade().map(Observable)
    }
}

impl fmt::Debug for WeakObservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakObservable")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

impl Observable {
    pub(crate) fn downgrade(&self) -> WeakObservable {
        WeakObservable(Rc::downgrade(&self.0))
    }

    /// Create an instance with every property at its default value.
    pub fn new(ty: &ObservableType) -> Self {
        let values = ty.properties().map(|p| p.default.clone()).collect();
        Self(Rc::new(ObjectInner {
            ty: ty.clone(),
            values: RefCell::new(values),
            source: Source::new(),
        }))
    }

    /// Create an instance and assign initial values without notifying.
    pub fn with_values<I, K, V>(ty: &ObservableType, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let object = Self::new(ty);
        {
            let mut slots = object.0.values.borrow_mut();
            for (name, value) in values {
                let slot = object.slot(name.as_ref())?;
                slots[slot] = value.into();
            }
        }
        Ok(object)
    }

    /// The instance's type.
    pub fn observable_type(&self) -> &ObservableType {
        &self.0.ty
    }

    /// Change-notification handle of this instance.
    pub fn source(&self) -> &Source {
        &self.0.source
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.0
            .ty
            .0
            .properties
            .get_index_of(name)
            .ok_or_else(|| Error::UnknownProperty {
                type_name: self.0.ty.name().to_owned(),
                property: name.to_owned(),
            })
    }

    /// Tracked read. Unknown properties read as Null.
    pub fn get(&self, name: &str) -> Value {
        let Ok(slot) = self.slot(name) else {
            warn!(
                type_name = self.0.ty.name(),
                property = name,
                "read of undeclared property"
            );
            return Value::Null;
        };
        if let Some(observer) = current_observer() {
            observer.watch(self.0.source.id(), Some(name), Some(self));
        }
        self.0.values.borrow()[slot].clone()
    }

    /// Read without reporting a dependency.
    pub fn get_untracked(&self, name: &str) -> Value {
        untracked(|| self.get(name))
    }

    /// Write a property.
    ///
    /// Writing a value equal to the current one (identity for objects, lists,
    /// templates and nodes) does nothing. Otherwise the value is stored, the
    /// property's change callback runs, then subscribers are notified.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let slot = self.slot(name).inspect_err(|_| {
            warn!(
                type_name = self.0.ty.name(),
                property = name,
                "write to undeclared property"
            );
        })?;
        let value = value.into();
        let old = {
            let mut values = self.0.values.borrow_mut();
            if values[slot] == value {
                return Ok(());
            }
            std::mem::replace(&mut values[slot], value.clone())
        };
        if let Some(changed) = self.0.ty.0.properties[slot].changed.clone() {
            changed(self, &old, &value);
        }
        self.0.source.notify(name);
        Ok(())
    }

    /// Notify subscribers of `name` without writing (for values mutated in place).
    pub fn notify(&self, name: &str) {
        self.0.source.notify(name);
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        let values = self.0.values.borrow();
        for (descriptor, value) in self.0.ty.properties().zip(values.iter()) {
            match value {
                // avoid recursing through object graphs
                Value::Object(object) => {
                    map.entry(&descriptor.name, &format_args!("{}", object.0.ty.name()))
                }
                other => map.entry(&descriptor.name, other),
            };
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::{Change, Subscriber};
    use std::cell::Cell;

    struct Counter(Cell<usize>);

    impl Subscriber for Counter {
        fn handle_change(self: Rc<Self>, _change: &Change<'_>) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn item_type() -> ObservableType {
        ObservableType::builder("Item")
            .property("name")
            .descriptor(PropertyDescriptor::new("count").default_value(0))
            .build()
            .unwrap()
    }

    #[test]
    fn derived_table_starts_with_base_properties() {
        let base = item_type();
        let derived = ObservableType::builder("Special")
            .extends(&base)
            .property("extra")
            .build()
            .unwrap();
        let names: Vec<_> = derived.properties().map(PropertyDescriptor::name).collect();
        assert_eq!(names, ["name", "count", "extra"]);
        assert_eq!(Observable::new(&derived).get("count"), Value::from(0));
    }

    #[test]
    fn redeclaring_a_base_property_is_rejected() {
        let base = item_type();
        let err = ObservableType::builder("Broken")
            .extends(&base)
            .property("name")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { .. }));
    }

    #[test]
    fn writing_the_same_value_does_not_notify() {
        let object = Observable::new(&item_type());
        let counter = Rc::new(Counter(Cell::new(0)));
        object.source().subscribe(counter.clone(), Some("name"));

        object.set("name", "a").unwrap();
        object.set("name", "a").unwrap();
        assert_eq!(counter.0.get(), 1);
        object.set("name", "b").unwrap();
        assert_eq!(counter.0.get(), 2);
    }

    #[test]
    fn object_values_compare_by_identity() {
        let ty = item_type();
        let holder = ObservableType::builder("Holder").property("item").build().unwrap();
        let object = Observable::new(&holder);
        let a = Observable::new(&ty);
        let counter = Rc::new(Counter(Cell::new(0)));
        object.source().subscribe(counter.clone(), Some("item"));

        object.set("item", a.clone()).unwrap();
        object.set("item", a).unwrap();
        object.set("item", Observable::new(&ty)).unwrap();
        assert_eq!(counter.0.get(), 2);
    }

    #[test]
    fn changed_callback_runs_before_subscribers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let callback_log = log.clone();
        let ty = ObservableType::builder("Logged")
            .descriptor(PropertyDescriptor::new("value").on_changed(move |_, old, new| {
                callback_log.borrow_mut().push(format!("{old:?}->{new:?}"));
            }))
            .build()
            .unwrap();
        let object = Observable::new(&ty);
        object.set("value", 1).unwrap();
        object.set("value", 1).unwrap();
        assert_eq!(*log.borrow(), ["Null->Number(1.0)"]);
    }

    #[test]
    fn unknown_properties_are_errors_on_write() {
        let object = Observable::new(&item_type());
        assert!(matches!(
            object.set("missing", 1),
            Err(Error::UnknownProperty { .. })
        ));
        assert_eq!(object.get("missing"), Value::Null);
        assert!(Observable::with_values(&item_type(), [("missing", 1)]).is_err());
    }
}
