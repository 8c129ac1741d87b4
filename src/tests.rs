/// End-to-end scenarios: observable writes flowing through compiled templates
use crate::{
    Event, Node, Observable, ObservableList, ObservableType, Transaction, Value, ViewTemplate,
    binding, html, is_update_scheduled, next_update, pending_update_count, process_updates,
    repeat, set_tick_trigger, when,
};
use std::cell::Cell;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

fn person_type() -> ObservableType {
    ObservableType::builder("Person")
        .property("name")
        .property("age")
        .property("visible")
        .property("friend")
        .property("items")
        .property("body")
        .property("clicks")
        .build()
        .unwrap()
}

fn person(name: &str) -> Observable {
    Observable::with_values(&person_type(), [("name", name)]).unwrap()
}

/// Element children, skipping the anchor comments views carry.
fn elements(parent: Node) -> Vec<Node> {
    parent
        .children()
        .into_iter()
        .filter(|node| node.tag_name().is_some())
        .collect()
}

#[test]
fn writing_an_equal_value_queues_nothing() {
    let ada = person("Ada");
    let template = html()
        .markup("<p>")
        .bind(binding!(|s| s.get("name")))
        .markup("</p>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);

    ada.set("name", "Ada").unwrap();
    assert!(!is_update_scheduled());
    assert_eq!(pending_update_count(), 0);

    ada.set("name", "Grace").unwrap();
    ada.set("name", "Hopper").unwrap();
    // one observer, one queued task
    assert_eq!(pending_update_count(), 1);
    process_updates();
    assert_eq!(host.text_content(), "Hopper");
}

#[test]
fn content_updates_rewrite_the_same_text_node() {
    let ada = person("Ada");
    let template = html()
        .markup("<p>Hello ")
        .bind(binding!(|s| s.get("name")))
        .markup("!</p>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);

    let p = elements(host)[0];
    let parts = p.children();
    assert_eq!(parts.len(), 3);
    assert_eq!(p.text_content(), "Hello Ada!");

    ada.set("name", "Grace").unwrap();
    process_updates();
    assert_eq!(p.children(), parts);
    assert_eq!(parts[1].data().as_deref(), Some("Grace"));
    assert_eq!(p.outer_html(), "<p>Hello Grace!</p>");
}

#[test]
fn list_edits_keep_existing_item_nodes() {
    let owner = person("owner");
    let items = ObservableList::from_vec(vec!["a".into(), "b".into(), "c".into()]);
    owner.set("items", items.clone()).unwrap();

    let item = html()
        .markup("<li>")
        .bind(binding!(|s| s.clone()))
        .markup("</li>")
        .build()
        .unwrap();
    let template = html()
        .markup("<ul>")
        .directive(repeat(binding!(|s| s.get("items")), item))
        .markup("</ul>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(owner), host);

    let ul = elements(host)[0];
    let before = elements(ul);
    assert_eq!(before.len(), 3);

    // [a, b, c] -> [a, c]: survivors keep their views, b's is disposed
    items.remove_range(1..2);
    process_updates();
    assert_eq!(elements(ul), [before[0], before[2]]);
    assert!(!before[1].is_alive());

    items.push("d");
    items.unshift("z");
    process_updates();
    let after = elements(ul);
    let text: Vec<_> = after.iter().map(|li| li.text_content()).collect();
    assert_eq!(text, ["z", "a", "c", "d"]);
    assert_eq!(after[1..3], [before[0], before[2]]);
}

#[test]
fn property_paths_follow_the_current_object() {
    let ada = person("Ada");
    let grace = person("Grace");
    let owner = person("owner");
    owner.set("friend", ada.clone()).unwrap();

    let template = html()
        .markup("<span>")
        .bind(binding!(|s| s.get("friend").get("name")))
        .markup("</span>")
        .build()
        .unwrap();
    let host = Node::element("div");
    cov_mark::check!(binding_chain_forces_refresh);
    let _view = template.render(&Value::from(owner.clone()), host);
    assert_eq!(host.text_content(), "Ada");

    ada.set("name", "Ada L.").unwrap();
    process_updates();
    assert_eq!(host.text_content(), "Ada L.");

    owner.set("friend", grace.clone()).unwrap();
    process_updates();
    assert_eq!(host.text_content(), "Grace");

    // the old object is no longer a dependency
    ada.set("name", "ignored").unwrap();
    assert_eq!(pending_update_count(), 0);

    grace.set("name", "Grace H.").unwrap();
    process_updates();
    assert_eq!(host.text_content(), "Grace H.");
}

#[test]
fn when_toggles_nested_content() {
    let ada = person("Ada");
    let details = html()
        .markup("<em>")
        .bind(binding!(|s| s.get("name")))
        .markup("</em>")
        .build()
        .unwrap();
    let template = html()
        .markup("<section>")
        .bind(when(binding!(|s| s.get("visible")), details))
        .markup("</section>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);
    let section = elements(host)[0];
    assert!(elements(section).is_empty());

    ada.set("visible", true).unwrap();
    process_updates();
    assert_eq!(section.text_content(), "Ada");

    // the nested view is bound too
    ada.set("name", "Grace").unwrap();
    process_updates();
    assert_eq!(elements(section)[0].outer_html(), "<em>Grace</em>");

    ada.set("visible", false).unwrap();
    process_updates();
    assert!(elements(section).is_empty());
}

#[test]
fn content_switches_between_template_and_text() {
    let badge = ViewTemplate::new("<b>new</b>", Vec::new()).unwrap();
    let ty = ObservableType::builder("Slot").property("content").build().unwrap();
    let slot = Observable::with_values(&ty, [("content", badge.clone())]).unwrap();

    let template = html()
        .markup("<div>")
        .bind(binding!(|s| s.get("content")))
        .markup("</div>")
        .build()
        .unwrap();
    let host = Node::element("main");
    let _view = template.render(&Value::from(slot.clone()), host);
    let div = elements(host)[0];
    let first = elements(div)[0];
    assert_eq!(first.outer_html(), "<b>new</b>");

    slot.set("content", "plain").unwrap();
    process_updates();
    assert!(elements(div).is_empty());
    assert_eq!(div.text_content(), "plain");

    slot.set("content", badge).unwrap();
    process_updates();
    // the same template comes back with the same view
    assert_eq!(elements(div), [first]);
    assert_eq!(div.text_content(), "new");
}

#[test]
fn inner_html_binding_parses_markup() {
    let ada = person("Ada");
    ada.set("body", "<i>rich</i> text").unwrap();
    let template = html()
        .markup("<article :innerHTML=")
        .bind(binding!(|s| s.get("body")))
        .markup("></article>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);

    let article = elements(host)[0];
    assert_eq!(article.inner_html(), "<i>rich</i> text");

    ada.set("body", "<b>bold</b>").unwrap();
    process_updates();
    assert_eq!(article.inner_html(), "<b>bold</b>");
}

#[test]
fn event_bindings_see_the_event_and_the_source() {
    let ada = person("Ada");
    ada.set("clicks", 0).unwrap();
    let template = html()
        .markup("<button @click=")
        .bind(binding!(|s, c| {
            let kind = c.event().map(|e| e.kind().to_owned()).unwrap_or_default();
            if let Some(object) = s.as_object() {
                let clicks = object.get("clicks").as_number().unwrap_or(0.0);
                let _ = object.set("clicks", clicks + 1.0);
                let _ = object.set("name", kind);
            }
            Value::Null
        }))
        .markup(">go</button>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);
    let button = elements(host)[0];

    let event = Event::new("click");
    assert!(!button.dispatch_event(&event));
    assert!(event.default_prevented());
    button.dispatch_event(&Event::new("click"));
    assert_eq!(ada.get_untracked("clicks"), Value::from(2));
    assert_eq!(ada.get_untracked("name"), Value::from("click"));

    // handlers run untracked, so nothing is re-evaluated
    assert_eq!(pending_update_count(), 0);
}

#[test]
fn transactions_flush_once_on_exit() {
    let fired = Rc::new(Cell::new(0));
    let counter = fired.clone();
    set_tick_trigger(move || counter.set(counter.get() + 1));

    let ada = person("Ada");
    ada.set("age", 36).unwrap();
    let template = html()
        .markup("<p>")
        .bind(binding!(|s| s.get("name")))
        .markup(" ")
        .bind(binding!(|s| s.get("age")))
        .markup("</p>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);

    Transaction::run(|| {
        ada.set("name", "Grace").unwrap();
        ada.set("age", 85).unwrap();
        assert_eq!(pending_update_count(), 2);
        assert_eq!(host.text_content(), "Ada 36");
    });
    assert_eq!(fired.get(), 0);
    assert_eq!(pending_update_count(), 0);
    assert_eq!(host.text_content(), "Grace 85");
}

#[test]
fn next_update_resolves_after_queued_bindings() {
    let ada = person("Ada");
    let template = html()
        .markup("<p>")
        .bind(binding!(|s| s.get("name")))
        .markup("</p>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let _view = template.render(&Value::from(ada.clone()), host);

    ada.set("name", "Grace").unwrap();
    let mut update = pin!(next_update());
    let mut cx = Context::from_waker(Waker::noop());
    assert_eq!(update.as_mut().poll(&mut cx), Poll::Pending);

    process_updates();
    assert_eq!(update.as_mut().poll(&mut cx), Poll::Ready(()));
    assert_eq!(host.text_content(), "Grace");
}

#[test]
fn leading_content_view_stays_inside_the_outer_view() {
    let ada = person("Ada");
    let inner = ViewTemplate::new("<i>n</i>", Vec::new()).unwrap();
    ada.set("body", inner).unwrap();
    let template = html()
        .bind(binding!(|s| s.get("body")))
        .markup("<b>x</b>")
        .build()
        .unwrap();
    let host = Node::element("div");
    let view = template.render(&Value::from(ada), host);
    assert_eq!(
        elements(host).iter().map(|n| n.outer_html()).collect::<Vec<_>>(),
        ["<i>n</i>", "<b>x</b>"]
    );

    view.remove();
    assert_eq!(host.inner_html(), "");
    view.append_to(host);
    assert_eq!(elements(host).len(), 2);

    let nested = elements(host)[0];
    view.dispose();
    assert_eq!(host.inner_html(), "");
    assert!(!nested.is_alive());
}
