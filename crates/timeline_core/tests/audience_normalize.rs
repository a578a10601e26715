mod common;

use common::{LOCAL, REMOTE};
use timeline_core::{
    resolve_addressee, AddresseeSubject, Audience, AudienceNormalizer, AuthorityRules,
    CoreOptions, Mention, MentionRelation, Post, ProfileRef,
};
use uuid::Uuid;

fn local(id: Uuid) -> ProfileRef {
    ProfileRef::new(id, LOCAL)
}

/// Posts covering every addressing shape the normalizer distinguishes.
fn sample_posts() -> Vec<Post> {
    let author = local(Uuid::new_v4());
    let co_author = ProfileRef::new(Uuid::new_v4(), REMOTE);
    let friend = local(Uuid::new_v4());
    let remote = ProfileRef::new(Uuid::new_v4(), REMOTE);

    let draft = Post::draft(author.clone(), 1_000);

    let mut public = Post::draft(author.clone(), 1_000);
    public.addressed_to.push(Mention::public());

    let mut co_authored = public.clone();
    co_authored.creators.insert(co_author.clone());

    let mut direct = Post::draft(author.clone(), 1_000);
    direct.addressed_to.push(Mention::to(friend.clone()));
    direct.addressed_to.push(Mention::to(remote.clone()));

    let mut followers_only = Post::draft(author.clone(), 1_000);
    followers_only.addressed_to.push(Mention::new(
        AddresseeSubject::Followers(author.clone()),
        MentionRelation::Cc,
    ));
    followers_only.addressed_to.push(Mention::new(
        AddresseeSubject::Followers(remote),
        MentionRelation::Cc,
    ));

    let mut explicit_public = Post::draft(author, 1_000);
    explicit_public.audience.insert(Audience::Public);
    explicit_public
        .audience
        .insert(Audience::addressed(friend.id));

    vec![
        draft,
        public,
        co_authored,
        direct,
        followers_only,
        explicit_public,
    ]
}

fn normalizer() -> AudienceNormalizer {
    AudienceNormalizer::new(CoreOptions::for_domain(LOCAL).local_authority())
}

#[test]
fn normalize_is_idempotent_for_all_shapes() {
    let normalizer = normalizer();
    for mut post in sample_posts() {
        let once = normalizer.normalize(&post);
        post.audience = once.clone();
        assert_eq!(normalizer.normalize(&post), once, "post {:?}", post.id);
    }
}

#[test]
fn public_implies_followers_of_every_creator() {
    let normalizer = normalizer();
    for post in sample_posts() {
        let audience = normalizer.normalize(&post);
        if audience.contains(&Audience::Public) {
            for creator in &post.creators {
                assert!(audience.contains(&Audience::followers(creator.id)));
            }
        }
    }
}

#[test]
fn normalize_keeps_recorded_audience() {
    let normalizer = normalizer();
    for post in sample_posts() {
        let audience = normalizer.normalize(&post);
        assert!(post.audience.is_subset(&audience));
    }
}

#[test]
fn draft_without_addressees_has_empty_audience() {
    let post = Post::draft(local(Uuid::new_v4()), 1_000);
    assert!(normalizer().normalize(&post).is_empty());
}

#[test]
fn only_local_followers_collections_resolve() {
    let author = local(Uuid::new_v4());
    let remote = ProfileRef::new(Uuid::new_v4(), REMOTE);
    let mut post = Post::draft(author.clone(), 1_000);
    post.addressed_to.push(Mention::new(
        AddresseeSubject::Followers(author.clone()),
        MentionRelation::Cc,
    ));
    post.addressed_to.push(Mention::new(
        AddresseeSubject::Followers(remote),
        MentionRelation::Cc,
    ));

    let audience = normalizer().normalize(&post);
    assert_eq!(audience.len(), 1);
    assert!(audience.contains(&Audience::followers(author.id)));
}

#[test]
fn aliases_and_ports_count_as_local() {
    let options = CoreOptions::from_json_str(
        r#"{"domain_name":"Social.Example","port":8443,"authority_aliases":["old.example"]}"#,
    )
    .unwrap();
    let rules = options.local_authority();

    assert!(rules.is_local("social.example:8443"));
    assert!(rules.is_local("https://OLD.example/users/alice"));
    assert!(!rules.is_local("social.example"));

    let alias_profile = ProfileRef::new(Uuid::new_v4(), "old.example");
    assert_eq!(
        resolve_addressee(&AddresseeSubject::Profile(alias_profile.clone()), &rules),
        Some(Audience::addressed(alias_profile.id))
    );
}

#[test]
fn uri_with_default_port_counts_as_local() {
    let rules = CoreOptions::for_domain(LOCAL).local_authority();
    assert!(rules.is_local("https://local.example:443/users/alice"));
    assert!(rules.is_local("http://local.example:80/users/alice"));
    assert!(!rules.is_local("https://local.example:8443/users/alice"));

    let friend = ProfileRef::new(Uuid::new_v4(), "https://local.example:443/users/friend");
    let mut post = Post::draft(local(Uuid::new_v4()), 1_000);
    post.addressed_to.push(Mention::to(friend.clone()));

    let audience = normalizer().normalize(&post);
    assert!(audience.contains(&Audience::addressed(friend.id)));
}

#[test]
fn injected_rules_decide_locality() {
    struct Everything;
    impl AuthorityRules for Everything {
        fn is_local(&self, _authority: &str) -> bool {
            true
        }
    }

    let remote = ProfileRef::new(Uuid::new_v4(), REMOTE);
    let mut post = Post::draft(local(Uuid::new_v4()), 1_000);
    post.addressed_to.push(Mention::to(remote.clone()));

    let audience = AudienceNormalizer::new(Everything).normalize(&post);
    assert!(audience.contains(&Audience::addressed(remote.id)));
}
