//! Reply composition and delivery.
//!
//! The Full variant is the complete scripted message; ShortPhrase picks one
//! terse line uniformly at random. Both carry the attribution footer.
//! `Responder::deliver` makes exactly one reply-submit call per invocation
//! and never retries; retries are the supervisor's business.

use std::sync::Arc;

use rand::Rng;

use crate::classify::ReplyVariant;
use crate::error::PlatformResult;
use crate::item::Item;
use crate::platform::Platform;

/// The complete scripted reply.
pub const FULL_REPLY: &str = r#"Are you kidding ??? What the **** are you talking about man ? You are a biggest looser i ever seen in my life ! You was doing PIPI in your pampers when i was beating players much more stronger then you! You are not proffesional, because proffesionals knew how to lose and congratulate opponents, you are like a girl crying after i beat you! Be brave, be honest to yourself and stop this trush talkings!!! Everybody know that i am very good blitz player, i can win anyone in the world in single game! And "w"esley "s"o is nobody for me, just a player who are crying every single time when loosing, ( remember what you say about Firouzja ) !!! Stop playing with my name, i deserve to have a good name during whole my chess carrier, I am Officially inviting you to OTB blitz match with the Prize fund! Both of us will invest 5000$ and winner takes it all!
I suggest all other people who's intrested in this situation, just take a look at my results in 2016 and 2017 Blitz World championships, and that should be enough... No need to listen for every crying babe, Tigran Petrosyan is always play Fair ! And if someone will continue Officially talk about me like that, we will meet in Court! God bless with true! True will never die ! Liers will kicked off..."#;

/// Terse one-liners for the low-effort variant.
pub const SHORT_PHRASES: &[&str] = &[
    "You was doing PIPI in your pampers.",
    "Be brave, be honest to yourself.",
    "True will never die!",
    "I am very good blitz player.",
    "Everybody know.",
];

/// Attribution footer appended to every reply.
pub const FOOTER: &str =
    "\n\n^(kibitz) ^| [^(source)](https://github.com/kibitz-bot/kibitz)\n";

/// Composes replies and submits them through the platform.
pub struct Responder {
    platform: Arc<dyn Platform>,
}

impl Responder {
    /// Create a responder over the shared platform handle.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Compose and submit one reply to `item`. No local state changes.
    pub fn deliver<R: Rng>(
        &self,
        item: &Item,
        variant: ReplyVariant,
        rng: &mut R,
    ) -> PlatformResult<()> {
        let text = compose(variant, rng);
        self.platform.reply(&item.id, &text)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder").finish()
    }
}

/// Build the reply text for a variant. Pure except for the phrase pick.
pub fn compose<R: Rng>(variant: ReplyVariant, rng: &mut R) -> String {
    let body = match variant {
        ReplyVariant::Full => FULL_REPLY,
        ReplyVariant::ShortPhrase => SHORT_PHRASES[rng.gen_range(0..SHORT_PHRASES.len())],
    };
    format!("{body}{FOOTER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::platform::MockPlatform;

    #[test]
    fn full_variant_carries_template_and_footer() {
        let mut rng = StdRng::seed_from_u64(1);
        let text = compose(ReplyVariant::Full, &mut rng);
        assert!(text.starts_with("Are you kidding ???"));
        assert!(text.ends_with(FOOTER));
    }

    #[test]
    fn short_variant_is_one_of_the_fixed_set() {
        let mut rng = StdRng::seed_from_u64(1);
        let text = compose(ReplyVariant::ShortPhrase, &mut rng);
        let body = text.strip_suffix(FOOTER).unwrap();
        assert!(SHORT_PHRASES.contains(&body));
    }

    #[test]
    fn short_variant_covers_the_whole_set_eventually() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let text = compose(ReplyVariant::ShortPhrase, &mut rng);
            seen.insert(text.strip_suffix(FOOTER).unwrap().to_string());
        }
        assert_eq!(seen.len(), SHORT_PHRASES.len());
    }

    #[test]
    fn deliver_makes_exactly_one_reply_call() {
        let mock = Arc::new(MockPlatform::new());
        let responder = Responder::new(Arc::clone(&mock) as Arc<dyn Platform>);
        let item = Item::comment("t1_a", Some("alice"), "petrosian");
        let mut rng = StdRng::seed_from_u64(1);

        responder.deliver(&item, ReplyVariant::Full, &mut rng).unwrap();

        let replies = mock.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, "t1_a");
        assert!(replies[0].1.contains("Are you kidding"));
    }

    #[test]
    fn deliver_does_not_retry_on_failure() {
        let mock = Arc::new(MockPlatform::new());
        *mock.fail_replies.lock().unwrap() = true;
        let responder = Responder::new(Arc::clone(&mock) as Arc<dyn Platform>);
        let item = Item::comment("t1_a", Some("alice"), "petrosian");
        let mut rng = StdRng::seed_from_u64(1);

        assert!(responder.deliver(&item, ReplyVariant::Full, &mut rng).is_err());
        assert!(mock.replies.lock().unwrap().is_empty());
    }
}
