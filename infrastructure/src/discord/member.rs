use crate::discord::user_id::serenity_to_domain_user_id;
use domain::ports::discord::Member;

pub fn serenity_to_domain_member(member: serenity::all::Member) -> Member {
    let serenity::all::Member { user, .. } = member;

    Member {
        user_id: serenity_to_domain_user_id(user.id),
        username: user.name,
        discriminator: user.discriminator.map(|discriminator| discriminator.get()),
    }
}
