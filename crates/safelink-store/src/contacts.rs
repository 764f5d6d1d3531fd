use rusqlite::params;

use safelink_shared::{ContactId, TrustedContact, UserId};

use crate::database::{decode_text, decode_ts, encode_ts, Database};
use crate::error::Result;

impl Database {
    /// A user's contacts, primary first, the rest in insertion order.
    pub fn contacts_for_user(&self, user: &UserId) -> Result<Vec<TrustedContact>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, name, phone_number, relationship, is_primary, created_at
             FROM trusted_contacts
             WHERE user_id = ?1
             ORDER BY is_primary DESC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![user.as_str()], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Insert a contact. A new primary demotes the user's previous one in the
    /// same transaction.
    pub fn insert_contact(&mut self, contact: &TrustedContact) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        if contact.is_primary {
            tx.execute(
                "UPDATE trusted_contacts SET is_primary = 0
                 WHERE user_id = ?1 AND is_primary = 1",
                params![contact.user_id.as_str()],
            )?;
        }
        tx.execute(
            "INSERT INTO trusted_contacts (id, user_id, name, phone_number, relationship,
                                           is_primary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                contact.id.to_string(),
                contact.user_id.as_str(),
                contact.name,
                contact.phone_number,
                contact.relationship,
                contact.is_primary,
                encode_ts(&contact.created_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Returns `false` when the contact does not exist or belongs to someone
    /// else.
    pub fn delete_contact(&self, user: &UserId, id: ContactId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM trusted_contacts WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user.as_str()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrustedContact> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let created_at: String = row.get(6)?;

    Ok(TrustedContact {
        id: decode_text(0, &id)?,
        user_id: UserId::new(user_id),
        name: row.get(2)?,
        phone_number: row.get(3)?,
        relationship: row.get(4)?,
        is_primary: row.get(5)?,
        created_at: decode_ts(6, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use safelink_shared::NewContact;

    fn contact(user: &str, name: &str, is_primary: bool) -> TrustedContact {
        NewContact {
            user_id: UserId::from(user),
            name: name.into(),
            phone_number: Some("+234 803 555 0101".into()),
            relationship: None,
            is_primary,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn new_primary_replaces_old_one() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_contact(&contact("u1", "Ada", true)).unwrap();
        db.insert_contact(&contact("u1", "Bola", false)).unwrap();
        db.insert_contact(&contact("u1", "Chidi", true)).unwrap();

        let contacts = db.contacts_for_user(&UserId::from("u1")).unwrap();
        let names: Vec<_> = contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Chidi", "Ada", "Bola"]);
        assert_eq!(contacts.iter().filter(|c| c.is_primary).count(), 1);
    }

    #[test]
    fn delete_is_scoped_to_owner() {
        let mut db = Database::open_in_memory().unwrap();
        let c = contact("u1", "Ada", false);
        db.insert_contact(&c).unwrap();

        assert!(!db.delete_contact(&UserId::from("u2"), c.id).unwrap());
        assert!(db.delete_contact(&UserId::from("u1"), c.id).unwrap());
        assert!(db.contacts_for_user(&UserId::from("u1")).unwrap().is_empty());
    }
}
