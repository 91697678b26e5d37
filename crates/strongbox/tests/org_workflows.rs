//! Organization workflows across several devices sharing one server.

use anyhow::Result;
use strongbox::access::{Account, InvitePurpose, Organization};
use strongbox::{ClientConfig, ErrorCode, OrgId, SyncEvent};
use strongbox_testkit::{ServerFixture, TestClient};

/// Invite `member` into `org` and confirm them, then let the member pick up
/// the membership.
async fn join(admin: &TestClient, member: &TestClient, org: &OrgId) -> Result<()> {
    let email = member.account().unwrap().email;
    let (invite, secret) = admin
        .create_invite(org, &email, InvitePurpose::JoinOrg)
        .await?;

    let mut received = member.get_invite(org, &invite.id).await?.unwrap();
    assert!(member.accept_invite(&mut received, &secret).await?);

    admin.confirm_invite(org, &invite.id).await?;
    member.synchronize().await?;
    Ok(())
}

async fn org_with_member(
    fixture: &ServerFixture,
) -> Result<(Account, TestClient, Account, TestClient, Organization)> {
    strongbox::logging::init_for_tests();
    let (alice, a) = fixture.login("alice").await;
    let (bob, b) = fixture.login("bob").await;
    let org = a.create_org("Acme").await?;
    join(&a, &b, &org.id).await?;
    let org = a.org(&org.id).unwrap();
    Ok((alice, a, bob, b, org))
}

#[tokio::test]
async fn test_create_org_makes_owner_admin() -> Result<()> {
    let fixture = ServerFixture::new();
    let (alice, a) = fixture.login("alice").await;

    let org = a.create_org("Acme").await?;
    assert!(org.is_owner(&alice.id));
    assert!(org.is_admin(&alice.id));
    assert!(org.is_unlocked());
    org.verify_everything()?;

    assert_eq!(a.account().unwrap().orgs, vec![org.id.clone()]);
    assert_eq!(fixture.server.org_revision(&org.id), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_invite_flow() -> Result<()> {
    let fixture = ServerFixture::new();
    let (alice, a) = fixture.login("alice").await;
    let (bob, b) = fixture.login("bob").await;
    let org = a.create_org("Acme").await?;

    let mut events = a.notifier().subscribe();
    let (invite, secret) = a
        .create_invite(&org.id, "bob@example.com", InvitePurpose::JoinOrg)
        .await?;
    let mut saw_invite = false;
    while let Ok(event) = events.try_recv() {
        saw_invite |= event
            == SyncEvent::InviteCreated {
                org: org.id.clone(),
                invite: invite.id.clone(),
            };
    }
    assert!(saw_invite);

    let mut received = b.get_invite(&org.id, &invite.id).await?.unwrap();
    assert!(!b.accept_invite(&mut received.clone(), "not-the-secret").await?);
    assert!(b.accept_invite(&mut received, &secret).await?);

    let member = a.confirm_invite(&org.id, &invite.id).await?;
    assert_eq!(member.id, bob.id);

    let org = a.org(&org.id).unwrap();
    assert!(org.is_member(&bob.id));
    assert!(org.invite(&invite.id).is_none());
    assert!(org.everyone.has_accessor(bob.id.as_str()));
    assert!(org.everyone.has_accessor(alice.id.as_str()));

    b.synchronize().await?;
    assert!(b.org(&org.id).is_some());
    assert!(b.account().unwrap().orgs.contains(&org.id));
    Ok(())
}

#[tokio::test]
async fn test_deleted_invite_is_gone() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a) = fixture.login("alice").await;
    let org = a.create_org("Acme").await?;

    let (invite, _) = a
        .create_invite(&org.id, "carol@example.com", InvitePurpose::JoinOrg)
        .await?;
    a.delete_invite(&org.id, &invite.id).await?;

    assert!(a.get_invite(&org.id, &invite.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_shared_vault_reaches_member() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, bob, b, org) = org_with_member(&fixture).await?;

    let vault = a
        .create_vault(&org.id, "Shared", &[org.everyone.id.clone()])
        .await?;
    let item = a.create_item(&vault.id, "Wifi", None, vec![]).await?;

    b.synchronize().await?;
    let (found, in_vault) = b.item(&item.id).unwrap();
    assert_eq!(in_vault, vault.id);
    assert_eq!(found.name, "Wifi");

    // Bob writes back through Everyone.
    let reply = b.create_item(&vault.id, "Printer", None, vec![]).await?;
    assert_eq!(reply.updated_by.as_ref(), Some(&bob.id));

    a.synchronize().await?;
    let names: Vec<String> = a
        .vault(&vault.id)
        .unwrap()
        .items()?
        .iter()
        .map(|i| i.name.clone())
        .collect();
    assert!(names.contains(&"Wifi".to_owned()));
    assert!(names.contains(&"Printer".to_owned()));
    Ok(())
}

#[tokio::test]
async fn test_group_revocation_rotates_vault_key() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, bob, b, org) = org_with_member(&fixture).await?;

    let eng = a.create_group(&org.id, "Engineering", &[bob.id.clone()]).await?;
    let vault = a.create_vault(&org.id, "Secrets", &[eng.id.clone()]).await?;
    a.create_item(&vault.id, "Deploy key", None, vec![]).await?;

    b.synchronize().await?;
    assert!(b.vault(&vault.id).is_some());
    let old_eng = b.org(&org.id).unwrap().group(&eng.id).unwrap().clone();

    a.update_group(&org.id, &eng.id, &[], None).await?;

    // Bob's pre-revocation group key no longer opens the vault.
    let mut old_eng = old_eng;
    old_eng.unlock(&bob)?;
    let mut remote = fixture.server.vault(&vault.id).unwrap();
    assert!(remote.unlock(&old_eng).is_err());

    // Alice can still read it after the rotation.
    assert_eq!(a.vault(&vault.id).unwrap().items()?.len(), 1);

    let report = b.synchronize().await?;
    assert!(report.purged.contains(&vault.id));
    assert!(b.vault(&vault.id).is_none());
    Ok(())
}

#[tokio::test]
async fn test_update_group_vault_grants() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, bob, b, org) = org_with_member(&fixture).await?;

    let vault = a.create_vault(&org.id, "Ops", &[]).await?;
    let eng = a.create_group(&org.id, "Engineering", &[bob.id.clone()]).await?;
    b.synchronize().await?;
    assert!(b.vault(&vault.id).is_none());

    let grants = [(vault.id.clone(), true)];
    let updated = a
        .update_group(&org.id, &eng.id, &[bob.id.clone()], Some(&grants[..]))
        .await?;
    assert_eq!(updated.vault(&vault.id).map(|g| g.readonly), Some(true));

    b.synchronize().await?;
    let shared = b.vault(&vault.id).unwrap();
    assert!(!b.has_write_permissions(&shared));
    let err = b
        .create_item(&vault.id, "Nope", None, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AccessDenied);
    Ok(())
}

#[tokio::test]
async fn test_default_readonly_grants() -> Result<()> {
    let fixture = ServerFixture::with_config(ClientConfig {
        default_vault_groups_readonly: true,
        ..ClientConfig::default()
    });
    let (alice, a, bob, b, org) = org_with_member(&fixture).await?;

    let vault = a
        .create_vault(&org.id, "Handbook", &[org.everyone.id.clone()])
        .await?;
    let org = a.org(&org.id).unwrap();
    assert_eq!(org.everyone.vault(&vault.id).map(|g| g.readonly), Some(true));
    assert_eq!(org.admins.vault(&vault.id).map(|g| g.readonly), Some(false));
    assert!(org.has_write_permissions(&vault.id, &alice.id));
    assert!(!org.has_write_permissions(&vault.id, &bob.id));

    b.synchronize().await?;
    assert!(!b.has_write_permissions(&b.vault(&vault.id).unwrap()));
    Ok(())
}

#[tokio::test]
async fn test_update_vault_renames_and_regrants() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, _, b, org) = org_with_member(&fixture).await?;

    let vault = a
        .create_vault(&org.id, "Shared", &[org.everyone.id.clone()])
        .await?;
    b.synchronize().await?;
    assert!(b.vault(&vault.id).is_some());

    let renamed = a.update_vault(&vault.id, "Admins only", &[]).await?;
    assert_eq!(renamed.name, "Admins only");

    let org = a.org(&org.id).unwrap();
    assert!(org.everyone.vault(&vault.id).is_none());
    assert!(org.admins.vault(&vault.id).is_some());
    assert_eq!(
        org.vaults.iter().find(|v| v.id == vault.id).map(|v| v.name.as_str()),
        Some("Admins only")
    );

    b.synchronize().await?;
    assert!(b.vault(&vault.id).is_none());
    Ok(())
}

#[tokio::test]
async fn test_update_member_moves_between_groups() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, bob, b, org) = org_with_member(&fixture).await?;

    let eng = a.create_group(&org.id, "Engineering", &[]).await?;
    let vault = a.create_vault(&org.id, "Builds", &[eng.id.clone()]).await?;

    a.update_member(&org.id, &bob.id, &[eng.id.clone()]).await?;
    let org_now = a.org(&org.id).unwrap();
    assert!(org_now.group(&eng.id).unwrap().has_accessor(bob.id.as_str()));
    assert!(!org_now.is_admin(&bob.id));
    // Everyone is untouched.
    assert!(org_now.everyone.has_accessor(bob.id.as_str()));

    b.synchronize().await?;
    assert!(b.vault(&vault.id).is_some());

    a.update_member(&org.id, &bob.id, &[org.admins.id.clone()]).await?;
    let org_now = a.org(&org.id).unwrap();
    assert!(org_now.is_admin(&bob.id));
    assert!(!org_now.group(&eng.id).unwrap().has_accessor(bob.id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_remove_member_drops_access() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, bob, b, org) = org_with_member(&fixture).await?;

    let vault = a
        .create_vault(&org.id, "Shared", &[org.everyone.id.clone()])
        .await?;
    b.synchronize().await?;
    assert!(b.vault(&vault.id).is_some());

    a.remove_member(&org.id, &bob.id).await?;
    assert!(!a.org(&org.id).unwrap().is_member(&bob.id));

    b.synchronize().await?;
    assert!(b.org(&org.id).is_none());
    assert!(b.vault(&vault.id).is_none());
    assert!(!b.account().unwrap().orgs.contains(&org.id));
    Ok(())
}

#[tokio::test]
async fn test_rotate_org_keys_keeps_vaults_readable() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a, _, b, org) = org_with_member(&fixture).await?;

    let vault = a
        .create_vault(&org.id, "Shared", &[org.everyone.id.clone()])
        .await?;
    a.create_item(&vault.id, "Alarm code", None, vec![]).await?;

    let rotated = a.rotate_org_keys(&org.id, false).await?;
    assert_ne!(rotated.public_key, org.public_key);
    rotated.verify_everything()?;

    b.synchronize().await?;
    assert_eq!(b.vault(&vault.id).unwrap().items()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_delete_vault() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, a) = fixture.login("alice").await;
    let org = a.create_org("Acme").await?;
    let vault = a.create_vault(&org.id, "Temp", &[]).await?;
    assert!(a.vault(&vault.id).is_some());

    a.delete_vault(&vault.id).await?;
    assert!(a.vault(&vault.id).is_none());
    assert!(fixture.server.vault(&vault.id).is_none());
    assert!(a.org(&org.id).unwrap().vaults.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_member_cannot_create_vault() -> Result<()> {
    let fixture = ServerFixture::new();
    let (_, _, _, b, org) = org_with_member(&fixture).await?;

    let err = b.create_vault(&org.id, "Mine", &[]).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AccessDenied);
    Ok(())
}
