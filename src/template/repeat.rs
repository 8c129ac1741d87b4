use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::dom::Node;
use crate::observable::{
    Binding, BindingObserver, Change, ExecutionContext, ObservableList, Subscriber,
};
use crate::splice::Splice;
use crate::template::{Behavior, View, ViewTemplate};
use crate::value::Value;

/// Options of a [`repeat`] directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepeatOptions {
    /// Give every item view its own context with `index` and `length`.
    pub positioning: bool,
    /// Rebind views of removed items to inserted items instead of creating
    /// new ones.
    pub recycle: bool,
}

impl Default for RepeatOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RepeatOptions {
    /// No positioning, recycling on.
    pub const fn new() -> Self {
        Self {
            positioning: false,
            recycle: true,
        }
    }

    /// Set positioning.
    pub fn positioning(mut self, positioning: bool) -> Self {
        self.positioning = positioning;
        self
    }

    /// Set recycling.
    pub fn recycle(mut self, recycle: bool) -> Self {
        self.recycle = recycle;
        self
    }
}

/// Renders one view per item of a list in front of its structural marker.
#[derive(Clone, Debug)]
pub struct RepeatDirective {
    items: Binding,
    template: Binding,
    options: RepeatOptions,
}

/// Render `template` for every item of the list `items` evaluates to.
///
/// `template` may be a [`ViewTemplate`] or a binding that selects one. Items
/// become the sources of their views.
pub fn repeat(items: Binding, template: impl Into<Binding>) -> RepeatDirective {
    RepeatDirective {
        items,
        template: template.into(),
        options: RepeatOptions::new(),
    }
}

impl RepeatDirective {
    /// Replace the options.
    pub fn options(mut self, options: RepeatOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn create_behavior(&self, location: Node) -> Box<dyn Behavior> {
        Box::new(RepeatBehavior::new(self, location))
    }
}

struct ItemView {
    view: View,
    context: Rc<ExecutionContext>,
}

#[derive(Default)]
struct RepeatState {
    source: Option<Value>,
    context: Option<Rc<ExecutionContext>>,
    /// Shared by all item views when positioning is off.
    child_context: Option<Rc<ExecutionContext>>,
    items: Option<ObservableList>,
    template: Option<ViewTemplate>,
    views: Vec<ItemView>,
}

struct RepeatCore {
    location: Node,
    options: RepeatOptions,
    items_observer: Rc<BindingObserver>,
    template_observer: Rc<BindingObserver>,
    state: RefCell<RepeatState>,
}

/// Behavior keeping one view per list item in sync with the list.
pub(crate) struct RepeatBehavior {
    core: Rc<RepeatCore>,
}

impl RepeatBehavior {
    fn new(directive: &RepeatDirective, location: Node) -> Self {
        let core = Rc::new_cyclic(|core: &Weak<RepeatCore>| {
            let subscriber: Weak<dyn Subscriber> = core.clone();
            RepeatCore {
                location,
                options: directive.options,
                items_observer: BindingObserver::new(directive.items.clone(), subscriber.clone()),
                template_observer: BindingObserver::new(directive.template.clone(), subscriber),
                state: RefCell::default(),
            }
        });
        Self { core }
    }
}

impl Behavior for RepeatBehavior {
    fn bind(&mut self, source: &Value, context: &Rc<ExecutionContext>) {
        self.core.bind(source, context);
    }

    fn unbind(&mut self) {
        self.core.unbind();
    }
}

impl Drop for RepeatBehavior {
    fn drop(&mut self) {
        // the list's notifier holds the core strongly
        self.core.unbind();
    }
}

impl Subscriber for RepeatCore {
    fn handle_change(self: Rc<Self>, change: &Change<'_>) {
        match change {
            Change::Binding { observer } if std::ptr::eq(*observer, &*self.items_observer) => {
                self.items_changed();
            }
            Change::Binding { observer } if std::ptr::eq(*observer, &*self.template_observer) => {
                self.template_changed();
            }
            Change::Splices { source, splices } => {
                let mut state = self.state.borrow_mut();
                let current = state.items.as_ref().and_then(|l| l.source().existing_id());
                if state.source.is_some() && current == Some(*source) {
                    self.update_views(&mut state, splices);
                }
            }
            _ => {}
        }
    }
}

impl RepeatCore {
    fn bind(self: &Rc<Self>, source: &Value, context: &Rc<ExecutionContext>) {
        let items = self.items_observer.observe(source, context);
        let template = self.template_observer.observe(source, context);

        let mut state = self.state.borrow_mut();
        state.source = Some(source.clone());
        state.context = Some(context.clone());
        state.child_context = Some(ExecutionContext::child(source.clone(), context));
        state.template = template.as_template().cloned();
        self.observe_items(&mut state, items.as_list().cloned());
        self.refresh_all_views(&mut state);
    }

    fn unbind(self: &Rc<Self>) {
        let mut state = self.state.borrow_mut();
        state.source = None;
        self.observe_items(&mut state, None);
        for item in &mut state.views {
            item.view.unbind();
        }
        drop(state);
        self.items_observer.disconnect();
        self.template_observer.disconnect();
    }

    fn items_changed(self: &Rc<Self>) {
        let (source, context) = {
            let state = self.state.borrow();
            match (&state.source, &state.context) {
                (Some(source), Some(context)) => (source.clone(), context.clone()),
                _ => return,
            }
        };
        let items = self.items_observer.observe(&source, &context);
        let items = items.as_list().cloned();
        let mut state = self.state.borrow_mut();
        let same = match (&state.items, &items) {
            (Some(old), Some(new)) => old.ptr_eq(new),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.observe_items(&mut state, items);
            self.refresh_all_views(&mut state);
        }
    }

    fn template_changed(self: &Rc<Self>) {
        let (source, context) = {
            let state = self.state.borrow();
            match (&state.source, &state.context) {
                (Some(source), Some(context)) => (source.clone(), context.clone()),
                _ => return,
            }
        };
        let template = self.template_observer.observe(&source, &context);
        let template = template.as_template().cloned();
        let mut state = self.state.borrow_mut();
        let same = match (&state.template, &template) {
            (Some(old), Some(new)) => old.ptr_eq(new),
            (None, None) => true,
            _ => false,
        };
        if !same {
            state.template = template;
            self.refresh_all_views(&mut state);
        }
    }

    /// Move the splice subscription from the current list to `items`.
    fn observe_items(self: &Rc<Self>, state: &mut RepeatState, items: Option<ObservableList>) {
        let subscriber: Rc<dyn Subscriber> = self.clone();
        if let Some(old) = state.items.take() {
            old.source().unsubscribe(&subscriber, None);
        }
        if let Some(new) = &items {
            new.source().subscribe(subscriber, None);
        }
        state.items = items;
    }

    fn item_context(&self, state: &RepeatState) -> Rc<ExecutionContext> {
        let shared = state
            .child_context
            .clone()
            .unwrap_or_else(ExecutionContext::default_context);
        if !self.options.positioning {
            return shared;
        }
        match (&state.source, &state.context) {
            (Some(source), Some(context)) => ExecutionContext::child(source.clone(), context),
            _ => shared,
        }
    }

    fn create_item_view(&self, state: &RepeatState, template: &ViewTemplate) -> ItemView {
        ItemView {
            view: template.create(None),
            context: self.item_context(state),
        }
    }

    /// Dispose every view and render the whole list again.
    fn refresh_all_views(&self, state: &mut RepeatState) {
        let old: Vec<View> = state.views.drain(..).map(|item| item.view).collect();
        View::dispose_contiguous_batch(old);

        let (Some(template), Some(items)) = (state.template.clone(), state.items.clone()) else {
            return;
        };
        let items = items.to_vec_untracked();
        for (index, item) in items.iter().enumerate() {
            let mut item_view = self.create_item_view(state, &template);
            self.position(&item_view, index, items.len());
            item_view.view.bind(item, &item_view.context);
            item_view.view.insert_before(self.location);
            state.views.push(item_view);
        }
        trace!(views = state.views.len(), "repeat rendered all items");
    }

    /// Apply one flush worth of splices to the view list.
    fn update_views(&self, state: &mut RepeatState, splices: &[Splice<Value>]) {
        let (Some(template), Some(items)) = (state.template.clone(), state.items.clone()) else {
            return;
        };
        let items = items.to_vec_untracked();
        let mut leftovers: VecDeque<ItemView> = VecDeque::new();
        let mut created = 0;
        let mut recycled = 0;

        for splice in splices {
            let start = splice.index.min(state.views.len());
            let end = (start + splice.removed.len()).min(state.views.len());
            let mut removed: VecDeque<ItemView> = state.views.drain(start..end).collect();

            for index in start..start + splice.added_count {
                let reused = if self.options.recycle {
                    removed.pop_front().or_else(|| leftovers.pop_front())
                } else {
                    None
                };
                let mut item_view = match reused {
                    Some(item_view) => {
                        cov_mark::hit!(repeat_view_recycled);
                        recycled += 1;
                        item_view
                    }
                    None => {
                        created += 1;
                        self.create_item_view(state, &template)
                    }
                };
                let location = state
                    .views
                    .get(index)
                    .map_or(self.location, |next| next.view.first_node());
                if let Some(item) = items.get(index) {
                    item_view.view.bind(item, &item_view.context);
                }
                item_view.view.insert_before(location);
                state.views.insert(index, item_view);
            }
            leftovers.extend(removed);
        }

        let disposed = leftovers.len();
        for item_view in leftovers {
            item_view.view.dispose();
        }
        let length = state.views.len();
        for (index, item_view) in state.views.iter().enumerate() {
            self.position(item_view, index, length);
        }
        trace!(created, recycled, disposed, "repeat applied splices");
    }

    fn position(&self, item_view: &ItemView, index: usize, length: usize) {
        if self.options.positioning {
            item_view.context.set_index(index);
            item_view.context.set_length(length);
        }
    }
}

impl fmt::Debug for RepeatBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatBehavior")
            .field("options", &self.core.options)
            .field("views", &self.core.state.borrow().views.len())
            .finish()
    }
}
