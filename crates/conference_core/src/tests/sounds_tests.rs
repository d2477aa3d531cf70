use super::*;
use crate::test_support::TestSoundPlayer;

#[test]
fn thresholds_reject_unordered_or_empty_tiers() {
    assert!(SoundThresholds::new(Vec::new()).is_err());
    assert!(SoundThresholds::new(vec![0, 5]).is_err());
    assert!(SoundThresholds::new(vec![1, 5, 5]).is_err());
    assert!(SoundThresholds::new(vec![1, 10, 5]).is_err());
    assert!(SoundThresholds::new(vec![2, 4, 8]).is_ok());
}

#[test]
fn highest_crossed_picks_largest_tier_not_above_count() {
    let thresholds = SoundThresholds::default();
    assert_eq!(thresholds.highest_crossed(0), None);
    assert_eq!(thresholds.highest_crossed(1), Some(1));
    assert_eq!(thresholds.highest_crossed(4), Some(1));
    assert_eq!(thresholds.highest_crossed(5), Some(5));
    assert_eq!(thresholds.highest_crossed(19), Some(10));
    assert_eq!(thresholds.highest_crossed(250), Some(20));
}

#[test]
fn one_cue_per_kind_in_first_appearance_order() {
    let mut batch = vec![ReactionKind::Clap; 6];
    batch.insert(0, ReactionKind::Laugh);
    batch.push(ReactionKind::Laugh);

    let cues = sound_cues(&batch, &SoundThresholds::default());

    assert_eq!(
        cues,
        vec![
            SoundCue {
                kind: ReactionKind::Laugh,
                tier: 1,
                sound_id: "REACTION_SOUND_LAUGH_1".into(),
            },
            SoundCue {
                kind: ReactionKind::Clap,
                tier: 5,
                sound_id: "REACTION_SOUND_CLAP_5".into(),
            },
        ]
    );
}

#[test]
fn counts_below_the_first_tier_stay_silent() {
    let thresholds = SoundThresholds::new(vec![3, 6]).unwrap();
    let cues = sound_cues(&[ReactionKind::Boo, ReactionKind::Boo], &thresholds);
    assert!(cues.is_empty());
}

#[test]
fn catalog_covers_every_kind_and_tier_plus_raise_hand() {
    let thresholds = SoundThresholds::new(vec![1, 10]).unwrap();
    let catalog = SoundCatalog::reactions(&thresholds);

    assert_eq!(catalog.resources().len(), ReactionKind::ALL.len() * 2 + 1);
    assert!(catalog.resources().contains(&SoundResource {
        id: "REACTION_SOUND_TADA_10".into(),
        file: "reactions-tada-10.mp3".into(),
    }));
    assert_eq!(
        catalog.resources().last().map(|resource| resource.id.as_str()),
        Some(RAISE_HAND_SOUND_ID)
    );
}

#[tokio::test]
async fn catalog_registers_and_unregisters_everything() {
    let player = TestSoundPlayer::default();
    let catalog = SoundCatalog::reactions(&SoundThresholds::default());

    catalog.register_all(&player).await;
    catalog.unregister_all(&player).await;

    let registered = player.registered.lock().await.clone();
    assert_eq!(registered.len(), catalog.resources().len());
    assert_eq!(*player.unregistered.lock().await, registered);
}
