use kvmodel_store::KeySpace;
use pretty_assertions::assert_eq;

#[test]
fn default_prefix() {
    let keys = KeySpace::default();
    assert_eq!(keys.prefix(), "kvmodel");
    assert_eq!(keys.hash("User", "7"), "kvmodel:hash:User:7");
}

#[test]
fn layout_per_region() {
    let keys = KeySpace::new("app");
    assert_eq!(keys.idset("User"), "app:idsets:User");
    assert_eq!(keys.id_counter("User"), "app:ids:User");
    assert_eq!(keys.unique("User", "email", "a@b.c"), "app:uniques:User:email:a@b.c");
    assert_eq!(keys.index("User", "city", "Oslo"), "app:index:User:city:Oslo");
    assert_eq!(keys.scored_index("User", "age"), "app:scoredindex:User:age");
    assert_eq!(
        keys.relation("User", "default", "Post", "1"),
        "app:relations:User:default:Post:1"
    );
    assert_eq!(
        keys.scored_relation("User", "likes", "Post", "1"),
        "app:scoredrelations:User:likes:Post:1"
    );
    assert_eq!(keys.relation_keys("User", "1"), "app:relationkeys:User:1");
    assert_eq!(keys.channel("User", "create"), "app:channel:User:create");
}

#[test]
fn prefixes_do_not_collide() {
    let a = KeySpace::new("a");
    let b = KeySpace::new("b");
    assert_ne!(a.hash("User", "1"), b.hash("User", "1"));
}
