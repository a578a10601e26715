mod common;

use common::{deny_all, local_profile, options, post_audiences, public_post, RecordingFeedStore};
use timeline_core::{
    open_db_in_memory, Audience, AuthzRequest, AuthzResource, CancelToken, Claim, ClaimPolicy,
    ClaimSet, Decision, RequestContext, ShareEvent, SqliteFeedStore, SqliteProfileRepository,
    TimelineAction, TimelineError, TimelineOperation, TimelineService,
};

#[test]
fn denied_publish_never_touches_the_store() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let service = TimelineService::new(
        RecordingFeedStore::new(SqliteFeedStore::new(&conn)),
        SqliteProfileRepository::new(&conn),
        deny_all,
        &options(),
    );

    let mut post = public_post(&author.to_ref(), 1_000);
    let err = service
        .handle_publish(&RequestContext::default(), &mut post)
        .unwrap_err();

    assert!(err.is_denied());
    assert!(matches!(
        err,
        TimelineError::Denied {
            operation: TimelineOperation::Publish,
            action: TimelineAction::Publish,
        }
    ));
    assert_eq!(service.feeds().batches_started(), 0);
    assert!(post.audience.is_empty());
}

#[test]
fn scoped_handle_acts_with_its_own_claims() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let stranger = local_profile("stranger");
    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        SqliteProfileRepository::new(&conn),
        ClaimPolicy::new(),
        &options(),
    );

    let as_stranger = service.scoped(ClaimSet::new([Claim::subject(stranger.id)]));
    let as_author = service.scoped(ClaimSet::new([Claim::subject(author.id)]));

    let mut post = public_post(&author.to_ref(), 1_000);
    let err = as_stranger.handle_publish(&mut post).unwrap_err();
    assert!(err.is_denied());

    as_author.handle_publish(&mut post).unwrap();
    assert!(post.audience.contains(&Audience::Public));
    assert_eq!(as_stranger.claims().subject(), Some(stranger.id));
}

#[test]
fn rescope_replaces_claims_instead_of_merging() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let stranger = local_profile("stranger");
    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        SqliteProfileRepository::new(&conn),
        ClaimPolicy::new(),
        &options(),
    );

    let as_author = service.scoped(ClaimSet::new([Claim::subject(author.id)]));
    let as_stranger = as_author.rescope(ClaimSet::new([Claim::subject(stranger.id)]));
    assert_eq!(as_stranger.claims().len(), 1);
    assert!(!as_stranger
        .claims()
        .has(timeline_core::authz::claims::CLAIM_SUBJECT, &author.id.to_string()));

    let mut post = public_post(&author.to_ref(), 1_000);
    assert!(as_stranger.handle_publish(&mut post).unwrap_err().is_denied());
    as_author.handle_publish(&mut post).unwrap();
}

#[test]
fn feed_reads_are_limited_to_the_owner_or_privileged_roles() {
    let conn = open_db_in_memory().unwrap();
    let mut reader = local_profile("reader");
    reader.audiences.insert(Audience::Public);
    let other = local_profile("other");
    SqliteProfileRepository::new(&conn)
        .save_profile(&reader)
        .unwrap();
    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        SqliteProfileRepository::new(&conn),
        ClaimPolicy::new().with_privileged_role("system"),
        &options(),
    );

    service
        .scoped(ClaimSet::new([Claim::subject(reader.id)]))
        .get_feed(reader.id, i64::MAX, None)
        .unwrap();

    let err = service
        .scoped(ClaimSet::new([Claim::subject(other.id)]))
        .get_feed(reader.id, i64::MAX, None)
        .unwrap_err();
    assert!(matches!(
        err,
        TimelineError::Denied {
            operation: TimelineOperation::GetFeed,
            action: TimelineAction::ReadFeed,
        }
    ));

    service
        .scoped(ClaimSet::new([Claim::role("system")]))
        .get_feed(reader.id, i64::MAX, None)
        .unwrap();
}

#[test]
fn resumed_feed_reads_are_authorized_like_first_pages() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let mut reader = local_profile("reader");
    reader.audiences.insert(Audience::Public);
    let other = local_profile("other");
    SqliteProfileRepository::new(&conn)
        .save_profile(&reader)
        .unwrap();
    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        SqliteProfileRepository::new(&conn),
        ClaimPolicy::new(),
        &options(),
    );

    let as_author = service.scoped(ClaimSet::new([Claim::subject(author.id)]));
    for published_at in [1_000, 2_000] {
        let mut post = public_post(&author.to_ref(), published_at);
        as_author.handle_publish(&mut post).unwrap();
    }

    let as_reader = service.scoped(ClaimSet::new([Claim::subject(reader.id)]));
    let first = as_reader.get_feed(reader.id, i64::MAX, Some(1)).unwrap();
    let cursor = first.next_cursor.unwrap();
    let second = as_reader.get_feed_after(reader.id, &cursor, Some(1)).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.entries[0].entry_time, 1_000);

    let err = service
        .scoped(ClaimSet::new([Claim::subject(other.id)]))
        .get_feed_after(reader.id, &cursor, Some(1))
        .unwrap_err();
    assert!(err.is_denied());
}

#[test]
fn share_requires_the_sharer_subject() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let sharer = local_profile("sharer");
    let service = TimelineService::new(
        RecordingFeedStore::new(SqliteFeedStore::new(&conn)),
        SqliteProfileRepository::new(&conn),
        ClaimPolicy::new(),
        &options(),
    );

    let mut post = public_post(&author.to_ref(), 1_000);
    post.shares.push(ShareEvent {
        sharer: sharer.to_ref(),
        shared_at: 2_000,
    });

    let as_author = service.scoped(ClaimSet::new([Claim::subject(author.id)]));
    assert!(as_author
        .handle_share(&post, &sharer.to_ref())
        .unwrap_err()
        .is_denied());
    assert_eq!(service.feeds().batches_started(), 0);

    service
        .scoped(ClaimSet::new([Claim::subject(sharer.id)]))
        .handle_share(&post, &sharer.to_ref())
        .unwrap();
}

#[test]
fn authorizer_sees_operation_action_and_resource() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let post = public_post(&author.to_ref(), 1_000);
    let expected_post = post.id;
    let author_id = author.id;
    let only_deletes_of_post = move |_: &ClaimSet, request: &AuthzRequest| {
        let matches = request.action == TimelineAction::Delete
            && matches!(
                &request.resource,
                AuthzResource::Post { post_id, creators }
                    if *post_id == expected_post && creators.contains(&author_id)
            );
        if matches {
            Decision::Allow
        } else {
            Decision::Deny
        }
    };
    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        SqliteProfileRepository::new(&conn),
        only_deletes_of_post,
        &options(),
    );

    let ctx = RequestContext::default();
    service.handle_delete(&ctx, &post).unwrap();
    let mut republished = post.clone();
    assert!(service
        .handle_publish(&ctx, &mut republished)
        .unwrap_err()
        .is_denied());
}

#[test]
fn scoped_cancellation_applies_to_later_calls() {
    let conn = open_db_in_memory().unwrap();
    let author = local_profile("author");
    let service = TimelineService::new(
        SqliteFeedStore::new(&conn),
        SqliteProfileRepository::new(&conn),
        ClaimPolicy::new(),
        &options(),
    );

    let token = CancelToken::new();
    let handle = service
        .scoped(ClaimSet::new([Claim::subject(author.id)]))
        .with_cancellation(token.clone());

    let mut first = public_post(&author.to_ref(), 1_000);
    handle.handle_publish(&mut first).unwrap();

    token.cancel();
    let mut second = public_post(&author.to_ref(), 2_000);
    let err = handle.handle_publish(&mut second).unwrap_err();
    assert!(matches!(err, TimelineError::Cancelled { .. }));
    assert!(post_audiences(&conn, second.id).is_empty());
}
